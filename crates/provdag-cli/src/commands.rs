use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use provdag_block::{metadata_from_json, Block, Metadata, SummaryBlock, Transaction};
use provdag_crypto::SigningKey;
use provdag_node::{Node, NodeConfig, NodeError};
use provdag_store::{Profile, StoreError};
use provdag_types::Digest;
use serde::Serialize;

use crate::cli::*;

const KEY_FILE: &str = "validator.key";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let out = Output(cli.format);
    let dir = cli.dir.as_path();
    match cli.command {
        Command::Init(args) => cmd_init(dir, args),
        Command::Keygen(args) => cmd_keygen(dir, args),
        Command::Produce(args) => cmd_produce(dir, out, args),
        Command::Show(args) => cmd_show(dir, out, args),
        Command::Tx(args) => cmd_tx(dir, out, args),
        Command::Tips(args) => cmd_tips(dir, out, args),
        Command::Height(args) => {
            let node = open_node(dir)?;
            out.blocks(&node.blocks_at_height(args.height)?)
        }
        Command::Type(args) => {
            let node = open_node(dir)?;
            out.blocks(&node.blocks_of_type(&args.supply_chain_type)?)
        }
        Command::Aggregate => cmd_aggregate(dir, out),
        Command::Checkpoint => cmd_checkpoint(dir, out),
        Command::Stats => cmd_stats(dir, out),
        Command::Reset(args) => cmd_reset(dir, args),
    }
}

// ---------------------------------------------------------------
// Node directory
// ---------------------------------------------------------------

fn load_key(dir: &Path) -> anyhow::Result<Option<SigningKey>> {
    let path = dir.join(KEY_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let hex = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let key = SigningKey::from_hex(&hex).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(key))
}

/// Load the node config from `dir`, resolving a relative data directory
/// against `dir` rather than the working directory.
pub(crate) fn load_config(dir: &Path) -> anyhow::Result<NodeConfig> {
    let path = NodeConfig::path_in(dir);
    let mut config = NodeConfig::load(&path)
        .with_context(|| format!("no node at {} (run `provdag init`)", dir.display()))?;
    if let Some(data_dir) = config.store.data_dir.as_ref().filter(|d| d.is_relative()) {
        config.store.data_dir = Some(dir.join(data_dir));
    }
    Ok(config)
}

fn open_node(dir: &Path) -> anyhow::Result<Node> {
    let node = Node::open(load_config(dir)?)?;
    Ok(match load_key(dir)? {
        Some(key) => node.with_signer(key),
        None => node,
    })
}

fn parse_digest(s: &str) -> anyhow::Result<Digest> {
    Digest::from_hex(s.trim()).with_context(|| format!("invalid digest {s:?}"))
}

fn write_key(path: &Path, key: &SigningKey) -> anyhow::Result<()> {
    fs::write(path, key.to_hex()).with_context(|| format!("writing {}", path.display()))
}

// ---------------------------------------------------------------
// Output
// ---------------------------------------------------------------

#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    fn json<T: Serialize>(&self, value: &T) -> anyhow::Result<bool> {
        if self.0 == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(value)?);
            return Ok(true);
        }
        Ok(false)
    }

    fn block(&self, block: &Block) -> anyhow::Result<()> {
        if self.json(block)? {
            return Ok(());
        }
        println!("{} {}", "block".bold(), block.hash.to_string().yellow());
        println!("  height:    {}", block.height);
        println!("  weight:    {}", block.dag_weight);
        println!("  type:      {}", block.supply_chain_type.cyan());
        println!("  time:      {}", format_millis(block.timestamp));
        println!("  validator: {}", block.validator.short_id());
        let signed = if block.verify_signature() {
            "✓ valid".green()
        } else {
            "unsigned".dimmed()
        };
        println!("  signature: {signed}");
        println!("  merkle:    {}", block.merkle_root.short_hex());
        if block.is_genesis() {
            println!("  parents:   {}", "(genesis)".dimmed());
        }
        for parent in &block.prev_hashes {
            println!("  parent:    {}", parent.short_hex().yellow());
        }
        for txn in &block.transactions {
            println!("  txn:       {} {}", txn.hash.short_hex(), txn.kind.dimmed());
        }
        Ok(())
    }

    fn blocks(&self, blocks: &[Block]) -> anyhow::Result<()> {
        if self.json(&blocks)? {
            return Ok(());
        }
        if blocks.is_empty() {
            println!("{}", "No blocks.".dimmed());
        }
        for block in blocks {
            println!("{}", block.summary());
        }
        Ok(())
    }

    fn summary(&self, summary: &SummaryBlock) -> anyhow::Result<()> {
        if self.json(summary)? {
            return Ok(());
        }
        println!("{} {}", summary.tier().to_string().bold(), summary.hash().to_string().yellow());
        println!("  time:      {}", format_millis(summary.timestamp()));
        println!("  folds:     {} blocks", summary.references().len());
        for reference in summary.references() {
            println!("  ref:       {}", reference.short_hex());
        }
        Ok(())
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("{millis}ms"))
}

// ---------------------------------------------------------------
// Commands
// ---------------------------------------------------------------

fn cmd_init(dir: &Path, args: InitArgs) -> anyhow::Result<()> {
    let config_path = NodeConfig::path_in(dir);
    if config_path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", config_path.display());
    }
    // Stored relative so the directory can be moved.
    let mut config = NodeConfig::for_dir(Path::new(""));
    if args.production {
        config.store.profile = Profile::Production;
    }
    config.save(&config_path)?;

    let key = SigningKey::generate();
    write_key(&dir.join(KEY_FILE), &key)?;

    println!("{} Initialized ProvDAG node in {}", "✓".green().bold(), dir.display().to_string().bold());
    println!("  Validator: {}", key.validator_key().short_id().cyan());
    println!("  Profile:   {:?}", config.store.profile);
    Ok(())
}

fn cmd_keygen(dir: &Path, args: KeygenArgs) -> anyhow::Result<()> {
    let key = SigningKey::generate();
    if args.write {
        let path = dir.join(KEY_FILE);
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        write_key(&path, &key)?;
        println!("{} Wrote {}", "✓".green().bold(), path.display());
    } else {
        println!("secret:    {}", key.to_hex());
    }
    println!("validator: {}", key.validator_key().to_hex().cyan());
    Ok(())
}

fn cmd_produce(dir: &Path, out: Output, args: ProduceArgs) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    let transactions = args
        .transactions
        .iter()
        .map(|raw| -> anyhow::Result<Transaction> {
            let payload: serde_json::Value =
                serde_json::from_str(raw).with_context(|| format!("invalid --txn JSON {raw:?}"))?;
            Ok(Transaction::from_json(args.kind.as_str(), &payload)?)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let metadata = match &args.meta {
        Some(raw) => {
            let value: serde_json::Value =
                serde_json::from_str(raw).with_context(|| "invalid --meta JSON")?;
            if !value.is_object() {
                bail!("--meta must be a JSON object");
            }
            metadata_from_json(&value)
        }
        None => Metadata::new(),
    };

    let block = match node.produce_block(transactions, args.supply_chain_type, metadata) {
        Err(NodeError::NoSigningKey) => bail!("no {KEY_FILE} in {} (run `provdag keygen --write`)", dir.display()),
        other => other?,
    };
    if out.0 == OutputFormat::Text {
        println!("{} Admitted block", "✓".green().bold());
    }
    out.block(&block)
}

fn cmd_show(dir: &Path, out: Output, args: HashArgs) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    let hash = parse_digest(&args.hash)?;
    match node.get_block(&hash) {
        Ok(block) => return out.block(&block),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e.into()),
    }
    match node.get_summary(&hash) {
        Ok(summary) => out.summary(&summary),
        Err(NodeError::Store(StoreError::NotFound(_))) => bail!("no block {}", hash),
        Err(e) => Err(e.into()),
    }
}

fn cmd_tx(dir: &Path, out: Output, args: HashArgs) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    let hash = parse_digest(&args.hash)?;
    let txn = match node.get_transaction(&hash) {
        Err(e) if e.is_not_found() => bail!("no transaction {}", hash),
        other => other?,
    };
    if out.json(&txn)? {
        return Ok(());
    }
    println!("{} {}", "txn".bold(), txn.hash.to_string().yellow());
    println!("  kind: {}", txn.kind.cyan());
    println!("  time: {}", format_millis(txn.timestamp));
    match txn.payload_json() {
        Some(json) => println!("  payload: {json}"),
        None => println!("  payload: {} bytes", txn.payload.len()),
    }
    Ok(())
}

fn cmd_tips(dir: &Path, out: Output, args: TipsArgs) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    let tips = if args.recompute {
        node.recompute_tips()?
    } else {
        node.tips()
    };
    if out.json(&tips)? {
        return Ok(());
    }
    if tips.is_empty() {
        println!("{}", "No tips (empty DAG).".dimmed());
    }
    for tip in &tips {
        let height = node.get_block(tip).map(|b| b.height).ok();
        match height {
            Some(h) => println!("{} (height {h})", tip.to_string().yellow()),
            None => println!("{}", tip.to_string().yellow()),
        }
    }
    Ok(())
}

fn cmd_aggregate(dir: &Path, out: Output) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    match node.aggregate_pending() {
        Ok(agg) => out.summary(&SummaryBlock::from(agg)),
        Err(e) if e.is_no_input() => {
            println!("{}", "Nothing to aggregate.".dimmed());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_checkpoint(dir: &Path, out: Output) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    match node.checkpoint_pending() {
        Ok(ckpt) => out.summary(&SummaryBlock::from(ckpt)),
        Err(e) if e.is_no_input() => {
            println!("{}", "Nothing to checkpoint.".dimmed());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_stats(dir: &Path, out: Output) -> anyhow::Result<()> {
    let node = open_node(dir)?;
    let stats = node.stats();
    if out.json(&stats)? {
        return Ok(());
    }
    let s = &stats.store;
    println!("{}", "Store".bold());
    println!("  blocks:        {}", s.blocks);
    println!("  transactions:  {}", s.transactions);
    println!("  aggregations:  {}", s.aggregation_blocks);
    println!("  checkpoints:   {}", s.checkpoint_blocks);
    println!("  pending:       {}", s.pending_data_blocks);
    println!("  heights:       {}", s.heights);
    println!("  types:         {}", s.supply_chain_types);
    println!("  wal:           {} bytes", s.wal_bytes);
    if s.skipped_records > 0 {
        println!("  skipped:       {}", s.skipped_records.to_string().red());
    }
    println!("{}", "Tips".bold());
    println!("  count:         {}", stats.tips.tips.len());
    println!("  version:       {}", stats.tips.version);
    Ok(())
}

fn cmd_reset(dir: &Path, args: ResetArgs) -> anyhow::Result<()> {
    if !args.yes {
        bail!("reset deletes every stored block; pass --yes to confirm");
    }
    let node = open_node(dir)?;
    node.reset()?;
    println!("{} Store reset", "✓".green().bold());
    Ok(())
}
