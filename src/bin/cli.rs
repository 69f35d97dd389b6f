//! Binary entry point for the soulstore administrative CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use soulstore::{
    admin::{rebuild_index, show, stats, verify, RebuildReport, StatsReport, VerifyReport},
    logging::init_logging,
    options::default_config_path,
    StoreOptions,
};

#[derive(Parser, Debug)]
#[command(
    name = "soulstore",
    version,
    about = "Inspect and repair a soulstore storage root",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Storage root (defaults to the config file's root, then gun-data)"
    )]
    root: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Options file (defaults to the platform config dir)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "SOULSTORE_LOG",
        default_value = "warn",
        help = "Log filter directive"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the index and node files.
    Stats,
    /// Check that the index and node files agree; exits 2 on errors.
    Verify,
    /// Rewrite index.json from the node files.
    RebuildIndex,
    /// Print one node as stored.
    Show {
        /// Soul of the node.
        soul: String,
        /// Restrict the output to one field.
        #[arg(long)]
        field: Option<String>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let root = resolve_root(&cli)?;

    match &cli.command {
        Command::Stats => {
            let report = stats(&root)?;
            emit(cli.format, &report, || print_stats_text(&report))?;
        }
        Command::Verify => {
            let report = verify(&root)?;
            emit(cli.format, &report, || print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::RebuildIndex => {
            let report = rebuild_index(&root)?;
            emit(cli.format, &report, || print_rebuild_text(&report))?;
        }
        Command::Show { soul, field } => match show(&root, soul, field.as_deref())? {
            Some(node) => emit(cli.format, &node, || {
                for (name, state, value) in node.fields() {
                    match state {
                        Some(state) => println!("{name} = {value}  (state {state})"),
                        None => println!("{name} = {value}"),
                    }
                }
            })?,
            None => {
                eprintln!("soul {soul} not found");
                std::process::exit(3);
            }
        },
    }
    Ok(())
}

fn resolve_root(cli: &Cli) -> Result<PathBuf, Box<dyn Error>> {
    if let Some(root) = &cli.root {
        return Ok(root.clone());
    }
    let path = cli.config.clone().or_else(|| {
        default_config_path().filter(|candidate| candidate.exists())
    });
    let options = match path {
        Some(path) => StoreOptions::from_toml_file(path)?,
        None => StoreOptions::default(),
    };
    Ok(options.root)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_stats_text(report: &StatsReport) {
    println!("Storage: {}", report.storage_dir);
    println!(
        "  nodes={} indexed_bytes={} index_bytes={}",
        report.nodes, report.indexed_bytes, report.index_bytes
    );
    println!(
        "  files_on_disk={} bytes_on_disk={}",
        report.files_on_disk, report.bytes_on_disk
    );
    if let Some(largest) = &report.largest {
        println!("  largest={} ({} bytes)", largest.soul, largest.size);
    }
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify => success={} indexed={} files_checked={} orphans={} shared_files={}",
        report.success,
        report.counts.indexed,
        report.counts.files_checked,
        report.counts.orphans,
        report.counts.shared_files,
    );
    for finding in &report.findings {
        println!("- {:?}: {}", finding.severity, finding.message);
    }
}

fn print_rebuild_text(report: &RebuildReport) {
    match report.previous_entries {
        Some(prev) => println!(
            "Rebuilt index: {} entries ({} bytes), previously {prev}",
            report.entries, report.bytes
        ),
        None => println!(
            "Rebuilt index: {} entries ({} bytes)",
            report.entries, report.bytes
        ),
    }
}
