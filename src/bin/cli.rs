//! atomickv CLI Client
//!
//! Command-line interface for a Redis-compatible server, going through
//! [`AtomicStore`] over a [`RemoteBackend`].

use clap::{Parser, Subcommand};
use atomickv::{AtomicStore, KvError, RemoteBackend, RemoteConfig, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// atomickv CLI
#[derive(Parser, Debug)]
#[command(name = "atomickv-cli")]
#[command(about = "CLI for atomickv batches against a RESP server")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "6379")]
    port: u16,

    /// Logical database index
    #[arg(short = 'n', long, default_value = "0")]
    db: u32,

    /// AUTH password
    #[arg(short = 'a', long)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Check whether a key exists
    Exists {
        /// The key to check
        key: String,
    },

    /// Ping the server
    Ping,

    /// Apply several operations atomically, e.g. `batch set a 1 del b`
    Batch {
        /// Sequence of `set <key> <value>` and `del <key>`
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        ops: Vec<String>,
    },
}

/// One parsed `batch` operation
#[derive(Debug, PartialEq)]
enum BatchOp {
    Set(String, String),
    Del(String),
}

fn parse_ops(tokens: &[String]) -> Result<Vec<BatchOp>> {
    let mut ops = Vec::new();
    let mut tokens = tokens.iter();
    while let Some(op) = tokens.next() {
        let mut operand = |what: &str| {
            tokens
                .next()
                .cloned()
                .ok_or_else(|| KvError::Config(format!("'{}' is missing its {}", op, what)))
        };
        match op.to_ascii_lowercase().as_str() {
            "set" => {
                let key = operand("key")?;
                let value = operand("value")?;
                ops.push(BatchOp::Set(key, value));
            }
            "del" => ops.push(BatchOp::Del(operand("key")?)),
            other => {
                return Err(KvError::Config(format!(
                    "unknown batch operation '{}' (expected set or del)",
                    other
                )))
            }
        }
    }
    Ok(ops)
}

fn run(args: Args) -> Result<()> {
    let mut builder = RemoteConfig::builder()
        .host(args.host)
        .port(args.port)
        .db(args.db);
    if let Some(password) = args.password {
        builder = builder.password(password);
    }

    let backend = RemoteBackend::connect(builder.build())?;

    if let Commands::Ping = args.command {
        backend.ping()?;
        println!("PONG");
        return Ok(());
    }

    let store = AtomicStore::new(backend);
    match args.command {
        Commands::Get { key } => match store.get(key.as_bytes()) {
            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
            Err(KvError::NotFound) => println!("(nil)"),
            Err(e) => return Err(e),
        },
        Commands::Set { key, value } => {
            store.set(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            store.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Exists { key } => {
            println!("{}", store.exists(key.as_bytes())? as u8);
        }
        Commands::Batch { ops } => {
            let ops = parse_ops(&ops)?;
            let count = ops.len();
            store.atomic_batch(|batch| -> Result<()> {
                for op in &ops {
                    match op {
                        BatchOp::Set(key, value) => batch.set(key.as_bytes(), value.as_bytes())?,
                        BatchOp::Del(key) => batch.delete(key.as_bytes())?,
                    }
                }
                Ok(())
            })?;
            println!("OK ({} operations)", count);
        }
        Commands::Ping => {}
    }
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("(error) {}", e);
        std::process::exit(1);
    }
}
