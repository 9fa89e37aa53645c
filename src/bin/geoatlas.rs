mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use geoatlas::config::{DEFAULT_BLOCKS_CSV, DEFAULT_DATABASE, DEFAULT_LABELS_CSV};
use geoatlas::GeoConfig;
use std::path::PathBuf;

use commands::{cmd_inspect, cmd_myip, cmd_query, cmd_rebuild, cmd_sample};

#[derive(Parser)]
#[command(name = "geoatlas")]
#[command(
    about = "Bilingual (English/Arabic) IPv4 geolocation index",
    long_about = "geoatlas - Build and query a bilingual IPv4 city database\n\n\
    Builds a MaxMind DB (MMDB) file from a locations table and an IPv4 blocks \n\
    table, then answers longest-prefix-match lookups with English and Arabic names.\n\n\
    Examples:\n\
      geoatlas rebuild\n\
      geoatlas query 8.8.8.8\n\
      geoatlas sample --limit 10\n\
      geoatlas inspect --verify\n\n\
    Logging goes to stderr; set RUST_LOG or pass -v for more detail."
)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PathArgs {
    /// Locations table (geoname_id, locale_code, names...), .csv or .csv.gz
    #[arg(long, global = true, env = "GEOATLAS_LABELS", default_value = DEFAULT_LABELS_CSV)]
    labels: PathBuf,

    /// IPv4 blocks table (network, geoname_id, ...), .csv or .csv.gz
    #[arg(long, global = true, env = "GEOATLAS_BLOCKS", default_value = DEFAULT_BLOCKS_CSV)]
    blocks: PathBuf,

    /// Index file written by rebuild and read by query/inspect
    #[arg(long, global = true, env = "GEOATLAS_DATABASE", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// database_type written into the index metadata
    #[arg(long, global = true, value_name = "NAME")]
    database_type: Option<String>,
}

impl PathArgs {
    fn into_config(self) -> GeoConfig {
        let mut config = GeoConfig {
            labels_csv: self.labels,
            blocks_csv: self.blocks,
            database: self.database,
            ..GeoConfig::default()
        };
        if let Some(database_type) = self.database_type {
            config.database_type = database_type;
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Look up one or more IP addresses
    Query {
        /// IPv4 or IPv6 addresses
        #[arg(value_name = "IP", required = true)]
        addresses: Vec<String>,
    },

    /// Rebuild the index from the CSV tables
    Rebuild,

    /// List the first block rows merged with their labels
    Sample {
        /// Number of rows (default: 100)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Report the caller address, preferring a forwarded one
    Myip {
        /// Address of the connecting peer
        #[arg(long)]
        peer: String,

        /// Value of the CF-Connecting-IP header, if any
        #[arg(long)]
        forwarded: Option<String>,
    },

    /// Show index metadata
    Inspect {
        /// Recompute and compare the stored checksum
        #[arg(long)]
        verify: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli_utils::init_logger(cli.verbose);
    let config = cli.paths.into_config();

    match cli.command {
        Commands::Query { addresses } => cmd_query(&config, addresses),
        Commands::Rebuild => cmd_rebuild(&config),
        Commands::Sample { limit } => cmd_sample(config, limit),
        Commands::Myip { peer, forwarded } => cmd_myip(peer, forwarded),
        Commands::Inspect { verify } => cmd_inspect(&config, verify),
    }
}
