use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Node the client commands talk to unless `--node` says otherwise
pub const DEFAULT_NODE: &str = "127.0.0.1:5000";

#[derive(Debug, Parser)]
#[command(name = "goodcoin")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "start", about = "Run a node until interrupted")]
    Start {
        #[arg(long, help = "TOML file with node settings")]
        config: Option<PathBuf>,
        #[arg(long, help = "host:port to listen on")]
        address: Option<String>,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma-separated host:port of peers to join"
        )]
        seeds: Vec<String>,
        #[arg(long, help = "Skip the automatic genesis block or initial sync")]
        ensemble: bool,
        #[arg(long, help = "Base mining difficulty")]
        difficulty: Option<u32>,
        #[arg(long, help = "Start as a bad node")]
        bad: bool,
    },
    #[command(name = "mine", about = "Mine a block from the pending transactions")]
    Mine {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    #[command(name = "chain", about = "Print the node's chain")]
    Chain {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    #[command(name = "utxos", about = "Print the node's unspent outputs")]
    Utxos {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
        #[arg(long, help = "Only outputs paid to this address")]
        address: Option<String>,
    },
    #[command(name = "pending", about = "Print the node's pending transactions")]
    Pending {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    #[command(name = "send", about = "Submit a transaction")]
    Send {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
        #[arg(long, help = "JSON array of the unspent outputs to spend")]
        inputs: String,
        #[arg(long, help = "JSON array of {\"amount\", \"addr\"} outputs")]
        outputs: String,
        #[arg(long, help = "Signing key of the input owner")]
        key: String,
    },
    #[command(name = "register", about = "Tell the node about a peer")]
    Register {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
        #[arg(help = "host:port of the peer")]
        peer: String,
    },
    #[command(name = "peers", about = "List the node's peers")]
    Peers {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    #[command(name = "resolve", about = "Ask the node to adopt the consensus chain")]
    Resolve {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
    #[command(name = "trust", about = "Show or change the node's trust mode")]
    Trust {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
        #[arg(long, help = "Switch between good and bad")]
        flip: bool,
    },
    #[command(name = "keys", about = "Show the node's keys or generate new ones")]
    Keys {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
        #[arg(long, help = "Generate a fresh keypair instead")]
        generate: bool,
    },
    #[command(name = "genesis", about = "Create the genesis block on an empty node")]
    Genesis {
        #[arg(long, default_value = DEFAULT_NODE)]
        node: String,
    },
}
