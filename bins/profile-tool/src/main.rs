//! Operator tool for recorded relink profiles: inspect headers, list
//! profiled functions, and validate documents before a rewrite run.

mod config;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use relink_binary::names;
use relink_profile::{is_yaml, HashFunction, ProfileDocument, ProfileFlags};
use tracing::debug;

use crate::config::{Config, MergedConfig};

#[derive(Parser)]
#[command(name = "profile-tool")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and validate recorded execution profiles")]
struct Cli {
    /// Specify custom configuration file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable logging to file (overrides config file)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    log: bool,

    /// Log file path (default: ./profile-tool.log)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a profile's header and totals
    #[command(name = "info", alias = "i")]
    Info {
        /// Profile file path
        profile: PathBuf,
    },
    /// List profiled functions
    #[command(name = "functions", alias = "f")]
    Functions {
        /// Profile file path
        profile: PathBuf,
        /// Substring filter on function names
        #[arg(long, value_name = "SUBSTRING")]
        name: Option<String>,
    },
    /// Validate that a file is a readable single-event profile
    #[command(name = "check", alias = "c")]
    Check {
        /// Profile file path
        profile: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let merged = MergedConfig::new(config, cli.log, cli.log_file.clone(), cli.log_level.as_deref())?;
    logging::initialize_logging(&merged)?;

    match &cli.command {
        Commands::Info { profile } => cmd_info(profile),
        Commands::Functions { profile, name } => cmd_functions(profile, name.as_deref()),
        Commands::Check { profile } => cmd_check(profile),
    }
}

fn load_document(path: &Path) -> Result<ProfileDocument> {
    if !is_yaml(path)? {
        bail!("{} is not a YAML profile document", path.display());
    }
    debug!("loading profile from {}", path.display());
    Ok(ProfileDocument::load(path)?)
}

fn cmd_info(path: &Path) -> Result<()> {
    let doc = load_document(path)?;

    let header = &doc.header;
    println!("Profile: {}", path.display());
    println!("  version:       {}", header.version);
    if !header.binary_name.is_empty() {
        println!("  binary:        {}", header.binary_name);
    }
    if !header.build_id.is_empty() {
        println!("  build id:      {}", header.build_id);
    }
    if !header.origin.is_empty() {
        println!("  origin:        {}", header.origin);
    }
    println!(
        "  mode:          {}",
        if header.is_sample() {
            "sample"
        } else if header.profile_flags().contains(ProfileFlags::LBR) {
            "lbr"
        } else {
            "unknown"
        }
    );
    println!(
        "  events:        {}",
        if header.event_names.is_empty() {
            "(none)"
        } else {
            &header.event_names
        }
    );
    println!("  block order:   {}", if header.is_dfs_order { "dfs" } else { "layout" });
    println!(
        "  hash function: {}",
        match header.hash_function {
            HashFunction::StdHash => "std",
            HashFunction::Xxh3 => "xxh3",
        }
    );

    let num_blocks: usize = doc.functions.iter().map(|f| f.blocks.len()).sum();
    let num_call_sites: usize = doc
        .functions
        .iter()
        .flat_map(|f| f.blocks.iter())
        .map(|b| b.call_sites.len())
        .sum();
    let branch_count: u64 = doc
        .functions
        .iter()
        .flat_map(|f| f.blocks.iter())
        .flat_map(|b| b.successors.iter())
        .map(|s| s.count)
        .sum();
    println!("  functions:     {}", doc.functions.len());
    println!("  blocks:        {num_blocks}");
    println!("  call sites:    {num_call_sites}");
    println!("  branch count:  {branch_count}");

    let file_locals = doc
        .functions
        .iter()
        .filter(|f| names::is_file_uniquified_local(names::strip_disambiguator(&f.name)))
        .count();
    if file_locals > 0 {
        println!("  note: {file_locals} local symbol(s) uniquified with a file name");
    }

    Ok(())
}

fn cmd_functions(path: &Path, filter: Option<&str>) -> Result<()> {
    let doc = load_document(path)?;

    println!(
        "{:>6}  {:>8}  {:>12}  {:>18}  name",
        "id", "blocks", "exec", "hash"
    );
    for func in &doc.functions {
        if let Some(filter) = filter {
            if !func.name.contains(filter) {
                continue;
            }
        }
        println!(
            "{:>6}  {:>8}  {:>12}  {:#018x}  {}",
            func.id, func.num_basic_blocks, func.exec_count, func.hash, func.name
        );
    }

    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let doc = load_document(path)?;
    doc.validate()?;
    println!(
        "{}: ok ({} functions, version {})",
        path.display(),
        doc.functions.len(),
        doc.header.version
    );
    Ok(())
}
