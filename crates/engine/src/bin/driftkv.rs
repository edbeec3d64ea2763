//! DriftKV command-line front-end.
//!
//! Opens the store at `--data-dir` and runs one operation against it.
//! Values are printed as UTF-8 when they decode cleanly, lossily otherwise.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use engine::{Config, Engine};

/// DriftKV CLI
#[derive(Parser, Debug)]
#[command(name = "driftkv")]
#[command(about = "Local CLI for the DriftKV key-value store")]
#[command(version)]
struct Args {
    /// Directory holding the WAL and SSTables
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to look up
        key: String,
    },

    /// Set a key to a value
    Set {
        /// The key to set
        key: String,

        /// The value to store
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List live entries in an inclusive key range
    Scan {
        /// First key of the range
        start: String,

        /// Last key of the range
        end: String,
    },

    /// Flush the memtable to an SSTable
    Flush,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let store = Engine::open(Config::default().with_root_dir(&args.data_dir))?;

    match args.command {
        Commands::Get { key } => match store.read(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            store.put(key.into_bytes(), value.into_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(key.into_bytes())?;
            println!("OK");
        }
        Commands::Scan { start, end } => {
            for (key, value) in store.read_range(start.as_bytes(), end.as_bytes())? {
                println!(
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Flush => {
            store.force_flush()?;
            println!("OK");
        }
    }

    Ok(())
}
