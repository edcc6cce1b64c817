//! atomickv Server Binary
//!
//! Serves in-memory databases over RESP for local development.

use clap::Parser;
use atomickv::network::Server;
use atomickv::{MemoryBackend, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// atomickv Server
#[derive(Parser, Debug)]
#[command(name = "atomickv-server")]
#[command(about = "In-memory RESP server with MULTI/EXEC batches")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Number of logical databases (SELECT 0..N-1)
    #[arg(short, long, default_value = "16")]
    databases: usize,

    /// Require clients to AUTH with this password
    #[arg(long)]
    password: Option<String>,

    /// Idle read timeout in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atomickv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("atomickv Server v{}", atomickv::VERSION);
    tracing::info!("Listen address: {}", args.listen);
    tracing::info!("Databases: {}", args.databases);

    let config = ServerConfig::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .read_timeout_ms(args.read_timeout_ms)
        .build();

    let databases = (0..args.databases).map(|_| MemoryBackend::new()).collect();

    let server = match Server::bind(config, databases, args.password) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
