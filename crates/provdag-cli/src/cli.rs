use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "provdag",
    about = "ProvDAG: a block-DAG ledger for supply-chain provenance",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Node directory holding provdag.toml, validator.key, and data/.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Repeat for more log output.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a node directory with a default config and a validator key
    Init(InitArgs),
    /// Generate a validator signing key
    Keygen(KeygenArgs),
    /// Produce, sign, and admit a block on top of the current tips
    Produce(ProduceArgs),
    /// Show a data, aggregation, or checkpoint block
    Show(HashArgs),
    /// Show a transaction
    Tx(HashArgs),
    /// Show the current tip set
    Tips(TipsArgs),
    /// List blocks at a height
    Height(HeightArgs),
    /// List blocks of a supply-chain type
    Type(TypeArgs),
    /// Fold pending data blocks into an aggregation block
    Aggregate,
    /// Fold pending aggregation blocks into a checkpoint block
    Checkpoint,
    /// Show store, cache, and tip statistics
    Stats,
    /// Delete every stored block (refused in production)
    Reset(ResetArgs),
}

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config and key.
    #[arg(long)]
    pub force: bool,
    /// Use the production profile (disables reset).
    #[arg(long)]
    pub production: bool,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Write the key to validator.key in the node directory.
    #[arg(long)]
    pub write: bool,
}

#[derive(Args)]
pub struct ProduceArgs {
    /// Supply-chain type tag, e.g. milk_collection.
    #[arg(short = 't', long = "type")]
    pub supply_chain_type: String,
    /// Transaction payload as JSON. Repeatable.
    #[arg(long = "txn")]
    pub transactions: Vec<String>,
    /// Transaction kind applied to every --txn.
    #[arg(long, default_value = "prov:Entity")]
    pub kind: String,
    /// Block metadata as a JSON object.
    #[arg(long)]
    pub meta: Option<String>,
}

#[derive(Args)]
pub struct HashArgs {
    /// Hex digest.
    pub hash: String,
}

#[derive(Args)]
pub struct TipsArgs {
    /// Rebuild the tip set from the store first.
    #[arg(long)]
    pub recompute: bool,
}

#[derive(Args)]
pub struct HeightArgs {
    pub height: u64,
}

#[derive(Args)]
pub struct TypeArgs {
    pub supply_chain_type: String,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Required confirmation.
    #[arg(long)]
    pub yes: bool,
}
