//! memcast CLI
//!
//! Runs a single command against a memcache cluster and prints the result.

use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use crossbeam::channel;
use tracing_subscriber::{fmt, EnvFilter};

use memcast::config::{HashAlgorithm, LocatorKind};
use memcast::{Config, MemcacheCluster};

/// memcast CLI
#[derive(Parser, Debug)]
#[command(name = "memcast-cli")]
#[command(about = "Command-line client for memcache clusters")]
#[command(version)]
struct Args {
    /// Server address (repeat for a cluster)
    #[arg(short, long = "server", default_value = "127.0.0.1:11211")]
    servers: Vec<String>,

    /// Extra nodes each request is sent to
    #[arg(short, long, default_value = "0")]
    replicas: usize,

    /// Use round-robin instead of ketama
    #[arg(long)]
    round_robin: bool,

    /// Hash ring points with CRC32 instead of BLAKE3
    #[arg(long)]
    crc32: bool,

    /// How long to wait for the answer, in milliseconds
    #[arg(short, long, default_value = "2000")]
    timeout_ms: u64,

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

        /// Opaque client flags
        #[arg(short, long, default_value = "0")]
        flags: u32,

        /// Expiration in seconds (0 = never)
        #[arg(short, long, default_value = "0")]
        expiration: u32,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Send a NoOp to every server
    Ping,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,memcast=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let wait = Duration::from_millis(args.timeout_ms);

    let config = Config::builder()
        .endpoints(args.servers.iter().cloned())
        .replicas(args.replicas)
        .locator(if args.round_robin {
            LocatorKind::RoundRobin
        } else {
            LocatorKind::Ketama
        })
        .hash(if args.crc32 {
            HashAlgorithm::Crc32
        } else {
            HashAlgorithm::Blake3
        })
        .build();

    let cluster = match MemcacheCluster::new(config) {
        Ok(cluster) => cluster,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };
    if let Err(e) = cluster.initialize() {
        tracing::error!("Failed to initialize cluster: {}", e);
        process::exit(2);
    }

    let code = match args.command {
        Commands::Get { key } => {
            let (tx, rx) = channel::bounded(1);
            run(&cluster, cluster.get(key, move |result| {
                let _ = tx.send(result);
            }));
            match rx.recv_timeout(wait) {
                Ok(result) => match result.value {
                    Some(value) => {
                        println!("{}", String::from_utf8_lossy(&value));
                        0
                    }
                    None => {
                        println!("({:?})", result.status);
                        1
                    }
                },
                Err(_) => timed_out(),
            }
        }

        Commands::Set {
            key,
            value,
            flags,
            expiration,
        } => {
            let (tx, rx) = channel::bounded(1);
            run(&cluster, cluster.set(key, value, flags, expiration, move |result| {
                let _ = tx.send(result);
            }));
            match rx.recv_timeout(wait) {
                Ok(result) => {
                    println!("{:?} (cas {})", result.status, result.cas);
                    exit_code(result.status.is_success())
                }
                Err(_) => timed_out(),
            }
        }

        Commands::Del { key } => {
            let (tx, rx) = channel::bounded(1);
            run(&cluster, cluster.delete(key, move |status| {
                let _ = tx.send(status);
            }));
            match rx.recv_timeout(wait) {
                Ok(status) => {
                    println!("{:?}", status);
                    exit_code(status.is_success())
                }
                Err(_) => timed_out(),
            }
        }

        Commands::Ping => {
            let mut all_ok = true;
            for node in cluster.nodes() {
                let (tx, rx) = channel::bounded(1);
                let sent = cluster.noop(node.endpoint(), move |header| {
                    let _ = tx.send(header.status);
                });
                let status = match sent {
                    Ok(_) => rx.recv_timeout(wait).ok(),
                    Err(e) => {
                        tracing::error!("{}", e);
                        None
                    }
                };
                match status {
                    Some(status) if status.is_success() => {
                        println!("{}: ok", node.endpoint());
                    }
                    Some(status) => {
                        println!("{}: {:?}", node.endpoint(), status);
                        all_ok = false;
                    }
                    None => {
                        println!("{}: no answer", node.endpoint());
                        all_ok = false;
                    }
                }
            }
            exit_code(all_ok)
        }
    };

    cluster.dispose();
    process::exit(code);
}

fn run(cluster: &MemcacheCluster, sent: memcast::Result<usize>) {
    if let Err(e) = sent {
        tracing::error!("Request rejected: {}", e);
        cluster.dispose();
        process::exit(2);
    }
}

fn exit_code(ok: bool) -> i32 {
    if ok {
        0
    } else {
        1
    }
}

fn timed_out() -> i32 {
    eprintln!("timed out");
    1
}
