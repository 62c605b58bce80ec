//! Ledger integration tests
//!
//! Drives a ledger through genesis, transfers and mining through the public
//! API only, and checks the properties every replica relies on.

use goodcoin::core::{chain_digest, consensus, Ledger, TxOutput};
use goodcoin::wallet::{generate_keypair, KeyPair};
use goodcoin::Block;
use std::collections::BTreeMap;

const REWARD: u64 = 2;
const DIFFICULTY: u32 = 1;

fn pay(ledger: &mut Ledger, from: &KeyPair, to: &str, amount: u64) {
    let owned = ledger.get_utxo_set().find_for_address(&from.address());
    let mut ins = vec![];
    let mut gathered = 0;
    for utxo in owned {
        if gathered >= amount {
            break;
        }
        gathered += utxo.amount;
        ins.push(utxo);
    }
    let mut outs = vec![TxOutput::new(amount, to)];
    if gathered > amount {
        outs.push(TxOutput::new(gathered - amount, &from.address()));
    }
    ledger
        .submit_transaction(ins, outs, &from.signing_key_text())
        .unwrap();
}

#[test]
fn test_value_only_enters_through_coinbase() {
    let alice = generate_keypair().unwrap();
    let bob = generate_keypair().unwrap();
    let mut ledger = Ledger::new(REWARD);
    ledger.genesis(&alice).unwrap();

    for _ in 0..3 {
        ledger.mine(&alice, DIFFICULTY).unwrap();
    }
    pay(&mut ledger, &alice, &bob.address(), 3);
    pay(&mut ledger, &alice, &bob.address(), 1);
    ledger.mine(&bob, DIFFICULTY).unwrap();

    // Genesis plus one reward per mined block
    let blocks = ledger.len() as u64;
    assert_eq!(ledger.get_utxo_set().total_value(), blocks * REWARD);
    assert_eq!(ledger.get_utxo_set().balance(&bob.address()), 4 + REWARD);
    assert_eq!(ledger.get_utxo_set().balance(&alice.address()), 4);

    // The set is exactly what replaying the chain produces
    let rebuilt = Ledger::rebuild(ledger.get_chain(), &[]).unwrap();
    assert_eq!(&rebuilt, ledger.get_utxo_set());
    assert!(ledger.snapshot().is_consistent());
}

#[test]
fn test_spent_outputs_cannot_be_spent_again() {
    let alice = generate_keypair().unwrap();
    let mut ledger = Ledger::new(REWARD);
    ledger.genesis(&alice).unwrap();
    let genesis_output = ledger.get_utxo_set().to_vec();

    ledger
        .submit_transaction(
            genesis_output.clone(),
            vec![TxOutput::new(REWARD, &alice.address())],
            &alice.signing_key_text(),
        )
        .unwrap();
    let err = ledger
        .submit_transaction(
            genesis_output,
            vec![TxOutput::new(REWARD, &alice.address())],
            &alice.signing_key_text(),
        )
        .unwrap_err();
    assert_eq!(err.code(), 400);
    assert_eq!(err.message(), "Inputs not found in UTXO pool.");
}

#[test]
fn test_tampered_chain_is_invalid() {
    let alice = generate_keypair().unwrap();
    let mut ledger = Ledger::new(REWARD);
    ledger.genesis(&alice).unwrap();
    ledger.mine(&alice, DIFFICULTY).unwrap();
    ledger.mine(&alice, DIFFICULTY).unwrap();
    assert!(Ledger::valid_chain(ledger.get_chain()));

    // Rewrite a middle block's timestamp through its JSON form
    let mut chain = ledger.get_chain().to_vec();
    let mut value = serde_json::to_value(&chain[1]).unwrap();
    value["timestamp"] = serde_json::json!(0);
    chain[1] = serde_json::from_value::<Block>(value).unwrap();
    assert!(!Ledger::valid_chain(&chain));

    let mut snapshot = ledger.snapshot();
    snapshot.chain = chain;
    snapshot.chain.push(ledger.get_chain()[2].clone());
    let mut other = Ledger::new(REWARD);
    assert!(other.replace(snapshot).is_err());
    assert!(other.is_empty());
}

#[test]
fn test_replicas_agree_on_majority_chain() {
    let miner = generate_keypair().unwrap();
    let mut origin = Ledger::new(REWARD);
    origin.genesis(&miner).unwrap();
    origin.mine(&miner, DIFFICULTY).unwrap();

    // Two replicas copy the origin, then one of them pulls ahead
    let mut follower = Ledger::new(REWARD);
    assert!(follower.replace(origin.snapshot()).unwrap());
    let mut leader = Ledger::new(REWARD);
    assert!(leader.replace(origin.snapshot()).unwrap());
    leader.mine(&miner, DIFFICULTY).unwrap();
    leader.mine(&miner, DIFFICULTY).unwrap();

    let mut digests = BTreeMap::new();
    digests.insert("origin".to_string(), chain_digest(origin.get_chain()).unwrap());
    digests.insert("follower".to_string(), chain_digest(follower.get_chain()).unwrap());
    digests.insert("leader".to_string(), chain_digest(leader.get_chain()).unwrap());
    assert_eq!(consensus(&digests), "leader");

    assert!(follower.replace(leader.snapshot()).unwrap());
    assert_eq!(follower.get_chain(), leader.get_chain());
    assert_eq!(follower.get_utxo_set(), leader.get_utxo_set());

    // Equal length is never a replacement
    assert!(!follower.replace(leader.snapshot()).unwrap());
}

#[test]
fn test_back_to_back_rewards_are_all_kept() {
    // Difficulty 0 forges blocks within the same millisecond as genesis
    for _ in 0..50 {
        let miner = generate_keypair().unwrap();
        let mut ledger = Ledger::new(REWARD);
        ledger.genesis(&miner).unwrap();
        ledger.mine(&miner, 0).unwrap();
        ledger.mine(&miner, 0).unwrap();

        let blocks = ledger.len() as u64;
        assert_eq!(ledger.get_utxo_set().len() as u64, blocks);
        assert_eq!(ledger.get_utxo_set().total_value(), blocks * REWARD);
    }
}
