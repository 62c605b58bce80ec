// Entry point for the goodcoin CLI: `start` runs a node in this process,
// every other command sends one request to a running node
use clap::Parser;
use goodcoin::{
    Command, Config, Node, Opt, PeerClient, Request, Response, Server, TxInput, TxOutput,
};
use log::{error, info, LevelFilter};
use std::process;
use std::time::Duration;

// Mining can take a while at higher difficulties, so clients wait longer than peers do
const CLIENT_TIMEOUT: Duration = Duration::from_secs(600);

fn main() {
    // Info is enough to follow mining and resolution; RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Start {
            config,
            address,
            seeds,
            ensemble,
            difficulty,
            bad,
        } => {
            // Defaults, then the file, then the environment, then the flags
            let mut settings = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            settings.apply_env()?;
            if let Some(address) = address {
                settings.node_address = address;
            }
            if !seeds.is_empty() {
                settings.seeds = seeds;
            }
            if let Some(difficulty) = difficulty {
                settings.base_difficulty = difficulty;
            }
            settings.ensemble |= ensemble;
            start_node(settings, bad)?;
        }
        Command::Mine { node } => match call(&node, Request::Mine)? {
            Response::Mined { block } => {
                println!("New block {} is mined!", block.get_index());
                print_json(&block)?;
            }
            other => return Err(unexpected(other)),
        },
        Command::Chain { node } => match call(&node, Request::GetChain)? {
            Response::Chain { chain, length } => {
                print_json(&chain)?;
                println!("Length: {length}");
            }
            other => return Err(unexpected(other)),
        },
        Command::Utxos { node, address } => match call(&node, Request::GetUtxos)? {
            Response::Utxos { mut utxos } => {
                if let Some(address) = address {
                    utxos.retain(|u| u.addr == address);
                    let balance: u64 = utxos.iter().map(|u| u.amount).sum();
                    println!("Balance of {address}: {balance}");
                }
                print_json(&utxos)?;
            }
            other => return Err(unexpected(other)),
        },
        Command::Pending { node } => match call(&node, Request::GetPending)? {
            Response::Pending { txs } => print_json(&txs)?,
            other => return Err(unexpected(other)),
        },
        Command::Send {
            node,
            inputs,
            outputs,
            key,
        } => {
            let inputs: Vec<TxInput> = serde_json::from_str(&inputs)
                .map_err(|e| format!("--inputs is not a list of unspent outputs: {e}"))?;
            let outputs: Vec<TxOutput> = serde_json::from_str(&outputs)
                .map_err(|e| format!("--outputs is not a list of outputs: {e}"))?;
            let request = Request::SubmitTransaction {
                inputs,
                outputs,
                priv_key: key,
                coinbase: false,
            };
            match call(&node, request)? {
                Response::Submitted { index } => {
                    println!("Transaction will be added to block {index}")
                }
                other => return Err(unexpected(other)),
            }
        }
        Command::Register { node, peer } => {
            match call(&node, Request::RegisterPeer { node: peer })? {
                Response::Peers { nodes } => {
                    println!("New nodes have been added");
                    print_json(&nodes)?;
                }
                other => return Err(unexpected(other)),
            }
        }
        Command::Peers { node } => match call(&node, Request::ListPeers)? {
            Response::Peers { nodes } => print_json(&nodes)?,
            other => return Err(unexpected(other)),
        },
        Command::Resolve { node } => match call(&node, Request::Resolve)? {
            Response::Resolved { replaced, chain } => {
                if replaced {
                    println!("Our chain was replaced");
                } else {
                    println!("Our chain is authoritative");
                }
                println!("Length: {}", chain.len());
            }
            other => return Err(unexpected(other)),
        },
        Command::Trust { node, flip } => {
            let request = if flip {
                Request::FlipTrust
            } else {
                Request::GetTrust
            };
            match call(&node, request)? {
                Response::Trust { good } => {
                    println!("{}", if good { "good" } else { "bad" })
                }
                other => return Err(unexpected(other)),
            }
        }
        Command::Keys { node, generate } => {
            let request = if generate {
                Request::GenerateKeys
            } else {
                Request::GetKeys
            };
            match call(&node, request)? {
                Response::Keys {
                    public_key,
                    secret_key,
                } => {
                    println!("Address: {public_key}");
                    println!("Signing key: {secret_key}");
                }
                other => return Err(unexpected(other)),
            }
        }
        Command::Genesis { node } => match call(&node, Request::Genesis)? {
            Response::Chain { chain, .. } => print_json(&chain)?,
            other => return Err(unexpected(other)),
        },
    }
    Ok(())
}

// Binds first so a port of 0 resolves before peers learn our address
fn start_node(mut settings: Config, bad: bool) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(&settings.node_address)?;
    settings.node_address = server.local_addr()?.to_string();

    let seeds = settings.seeds.clone();
    let ensemble = settings.ensemble;
    let node = Node::new(settings)?;
    if bad {
        node.set_trust(false);
    }
    info!("Trust mode is {}", node.trust());

    let handle = server.spawn(node.clone());
    node.join(&seeds);
    if !ensemble {
        node.start()?;
    }

    handle
        .join()
        .map_err(|_| "Server thread panicked".to_string())?;
    Ok(())
}

fn call(node: &str, request: Request) -> Result<Response, Box<dyn std::error::Error>> {
    let client = PeerClient::new(CLIENT_TIMEOUT);
    Ok(client.call(node, &request)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn unexpected(response: Response) -> Box<dyn std::error::Error> {
    format!("Unexpected response: {response:?}").into()
}
