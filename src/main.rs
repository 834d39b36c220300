//! valkey-cluster-admin - inspect a Valkey cluster and add replicas to it.
//!
//! Subcommands:
//! - `tree`: topology as a master/replica tree
//! - `whoami`: the node that answered, with its replicas or master
//! - `count-key-slot`: per-shard key distribution
//! - `add-replica`: join an empty node as a replica of a master

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use valkey_cluster_admin::client::{
    ClientConfig, DEFAULT_ENDPOINT, JoinOptions, add_replica, load_topology,
};
use valkey_cluster_admin::cluster::{DnsResolver, HostResolver, LiteralResolver, Topology};
use valkey_cluster_admin::render::{render_shard_stats, render_tree, render_whoami};
use valkey_cluster_admin::slots::{AnalyzeOptions, SlotBounds, analyze_cluster};

#[derive(Parser, Debug)]
#[command(name = "valkey-cluster-admin", version)]
#[command(about = "Inspect and extend a Valkey cluster", long_about = None)]
struct Cli {
    /// Print debug logs
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Password for AUTH
    #[arg(long, env = "VALKEY_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Connect with TLS
    #[arg(long, global = true)]
    tls: bool,

    /// Command timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cluster as a master/replica tree
    Tree {
        /// Leave replicas out
        #[arg(long)]
        masters_only: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        #[arg(default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },

    /// Describe the node that answers on HOST:PORT
    Whoami {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        #[arg(default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },

    /// Count keys per slot on every master
    CountKeySlot {
        /// Print the N slots holding the most keys per shard
        #[arg(long, default_value_t = 0)]
        rank: usize,

        /// Walk each slot range as [start, end) instead of [start, end]
        #[arg(long)]
        exclusive_bounds: bool,

        #[arg(default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },

    /// Add an empty node as a replica of a master
    AddReplica {
        /// The node to add, HOST:PORT
        new_node: String,

        /// The master to replicate, HOST:PORT
        master: String,

        /// Seconds to wait between CLUSTER MEET and CLUSTER REPLICATE
        #[arg(long, default_value_t = 5)]
        settle_secs: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_directive = if verbose {
        "valkey_cluster_admin=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn host_resolver() -> Box<dyn HostResolver> {
    match DnsResolver::from_system_conf() {
        Ok(resolver) => Box::new(resolver),
        Err(e) => {
            warn!(error = %e, "System resolver unavailable, showing IP addresses");
            Box::new(LiteralResolver)
        }
    }
}

fn client_config(cli: &Cli, endpoint: &str) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    Ok(ClientConfig::from_endpoint(endpoint)?
        .with_password(cli.password.clone())
        .with_tls(cli.tls)
        .with_command_timeout(Duration::from_secs(cli.timeout)))
}

async fn fetch_cluster(config: &ClientConfig) -> Result<Topology, Box<dyn std::error::Error>> {
    let resolver = host_resolver();
    Ok(load_topology(config, &config.host, config.port, resolver.as_ref()).await?)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Tree {
            masters_only,
            output,
            endpoint,
        } => {
            let topology = fetch_cluster(&client_config(&cli, endpoint)?).await?;
            match output {
                OutputFormat::Text => print!("{}", render_tree(&topology, *masters_only)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&topology)?),
            }
        }

        Command::Whoami { output, endpoint } => {
            let topology = fetch_cluster(&client_config(&cli, endpoint)?).await?;
            match output {
                OutputFormat::Text => {
                    let text = render_whoami(&topology)
                        .ok_or("no node flagged `myself` in CLUSTER NODES output")?;
                    print!("{text}");
                }
                OutputFormat::Json => {
                    let myself = topology
                        .myself()
                        .ok_or("no node flagged `myself` in CLUSTER NODES output")?;
                    println!("{}", serde_json::to_string_pretty(myself)?);
                }
            }
        }

        Command::CountKeySlot {
            rank,
            exclusive_bounds,
            endpoint,
        } => {
            let config = client_config(&cli, endpoint)?;
            let topology = fetch_cluster(&config).await?;
            let bounds = if *exclusive_bounds {
                SlotBounds::Exclusive
            } else {
                SlotBounds::Inclusive
            };
            let options = AnalyzeOptions::new(*rank).with_slot_bounds(bounds);

            let mut failed = 0usize;
            for report in analyze_cluster(&topology, &options, &config).await {
                match &report.stats {
                    Ok(stats) => print!(
                        "{}",
                        render_shard_stats(&report.node, stats, report.used_memory.as_deref(), *rank)
                    ),
                    Err(e) => {
                        eprintln!("{} {}: {e}", report.node.id, report.node.endpoint());
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} shard(s) could not be analyzed").into());
            }
        }

        Command::AddReplica {
            new_node,
            master,
            settle_secs,
        } => {
            let config = client_config(&cli, new_node)?;
            let master_endpoint = ClientConfig::from_endpoint(master)?;
            let options = JoinOptions {
                settle_delay: Duration::from_secs(*settle_secs),
            };

            let master_id = add_replica(
                &config,
                (&config.host, config.port),
                (&master_endpoint.host, master_endpoint.port),
                &options,
            )
            .await?;
            info!(%master_id, node = %new_node, "Replica added");
            println!("{new_node} now replicates {master_id}");
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    tokio::select! {
        result = run(cli) => result,
        _ = signal::ctrl_c() => {
            warn!("Interrupted");
            Err("interrupted".into())
        }
    }
}
