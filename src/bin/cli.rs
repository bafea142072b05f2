//! FileRecords CLI
//!
//! Command-line interface for inspecting and feeding a dynamic record store.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use filerecords::{DynamicStore, RecordFile, Resource, Schema, StoreConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// FileRecords CLI
#[derive(Parser, Debug)]
#[command(name = "filerecords-cli")]
#[command(about = "CLI for the FileRecords dynamic record store")]
#[command(version)]
struct Args {
    /// Store header file (shard files live next to it)
    #[arg(short, long, default_value = "./records.drs")]
    store: PathBuf,

    /// Open shard index files kept at once
    #[arg(long, default_value = "10")]
    shard_cache: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a store (or check an existing one against this schema)
    Init {
        /// Records per shard (1..=100000000)
        #[arg(short, long, default_value = "100000")]
        records_per_shard: u32,

        /// Bytes per payload offset (2..=4)
        #[arg(short, long, default_value = "4")]
        offset_width: u8,

        /// Bytes per payload length (1..=4)
        #[arg(short, long, default_value = "2")]
        length_width: u8,
    },

    /// Append a record and print its number
    Append {
        /// Record data; read from stdin when omitted
        data: Option<String>,
    },

    /// Read a record and write it to stdout
    Read {
        /// Global record number
        record: u64,
    },

    /// Print the number of records
    Count,

    /// Print the shard numbers
    Shards,

    /// Read the first bytes of a file or URL as fixed-size records
    Probe {
        /// Local path or http(s) URL
        resource: String,

        /// Record size in bytes
        #[arg(short, long, default_value = "1")]
        record_size: u64,

        /// Bytes to fetch
        #[arg(short, long, default_value = "1100")]
        max_len: u64,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,filerecords=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> filerecords::Result<()> {
    let config = StoreConfig::builder()
        .header_path(&args.store)
        .shard_cache_capacity(args.shard_cache);

    match args.command {
        Commands::Init {
            records_per_shard,
            offset_width,
            length_width,
        } => {
            let schema = Schema::new(records_per_shard, offset_width, length_width)?;
            let store = DynamicStore::open_with_config(config.schema(schema).build())?;
            tracing::info!("Store ready: {} ({:?})", store.layout().header_path().display(), store.schema());
        }
        Commands::Append { data } => {
            let payload = match data {
                Some(data) => data.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let store = DynamicStore::open_with_config(config.build())?;
            println!("{}", store.append(&payload)?);
        }
        Commands::Read { record } => {
            let store = DynamicStore::open_with_config(config.build())?;
            let data = store.read(record)?;
            let mut stdout = io::stdout();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Commands::Count => {
            let store = DynamicStore::open_with_config(config.build())?;
            println!("{}", store.record_count(true)?);
        }
        Commands::Shards => {
            let store = DynamicStore::open_with_config(config.build())?;
            for shard in store.shard_numbers(true)? {
                println!("{}", shard);
            }
        }
        Commands::Probe {
            resource,
            record_size,
            max_len,
        } => {
            let mut file = RecordFile::new(Resource::parse(&resource), record_size)?;
            match file.read_first_bytes(max_len, 1)? {
                Some(part) => {
                    let total = part
                        .total_size
                        .map(|size| size.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    println!("read:    {} bytes", part.len());
                    println!("total:   {}", total);
                    println!("remote:  {}", part.remote);
                    if let Some(size) = part.total_size {
                        println!("records: {}", size / record_size);
                    }
                }
                None => println!("empty"),
            }
        }
    }
    Ok(())
}
