//! Oracle cluster CLI
//!
//! Command-line interface for running and inspecting oracle nodes.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oracle_consensus::MemoryLedger;
use oracle_crypto::NodeKeyPair;
use oracle_network::InMemoryHub;
use oracle_node::config::LoggingConfig;
use oracle_node::{NodeConfig, OracleNode};
use oracle_trades::{MarketDataSource, MemoryMarketData};

#[derive(Parser)]
#[command(name = "oracled")]
#[command(version)]
#[command(about = "Oracle cluster node - collectively signed price and system transactions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node against the in-process chain and transport
    Node {
        /// Configuration file path
        #[arg(short, long, default_value = "oracle.toml", env = "ORACLE_CONFIG")]
        config: PathBuf,
    },

    /// Generate a node keypair
    Keygen {
        /// Output file for the hex secret key
        #[arg(short, long, default_value = "node.key")]
        output: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Show node identity, cluster and contracts
    Info {
        #[arg(short, long, default_value = "oracle.toml", env = "ORACLE_CONFIG")]
        config: PathBuf,
    },

    /// Validate a configuration file
    CheckConfig {
        #[arg(short, long, default_value = "oracle.toml", env = "ORACLE_CONFIG")]
        config: PathBuf,
    },
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false),
            )
            .init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<NodeConfig> {
    NodeConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))
}

async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    let membership = config.membership()?;
    let node_id = config.load_keypair()?.node_id();

    let ledger = Arc::new(MemoryLedger::new(
        config.node.network_passphrase.clone(),
        membership,
    ));
    let hub = InMemoryHub::new();
    let (messenger, inbox) = hub.join(node_id);
    let sources: Vec<Arc<dyn MarketDataSource>> = config
        .trades
        .sources
        .iter()
        .map(|name| Arc::new(MemoryMarketData::new(name.clone())) as Arc<dyn MarketDataSource>)
        .collect();

    let node = OracleNode::new(config, ledger, Arc::new(messenger), sources)?;
    node.run(inbox).await
}

fn keygen(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let keypair = NodeKeyPair::generate();
    std::fs::write(output, keypair.secret_hex().as_bytes())?;

    println!("Keypair generated successfully!");
    println!("Public key: {}", keypair.node_id().to_hex());
    println!("Secret key: {}", output.display());
    Ok(())
}

fn info(config: &NodeConfig) -> anyhow::Result<()> {
    let node_id = config.load_keypair()?.node_id();
    let membership = config.membership()?;

    println!("Node: {}", config.node.name);
    println!("Public key: {}", node_id.to_hex());
    println!("Member: {}", membership.is_member(&node_id));
    println!();
    println!(
        "Cluster: {} members, quorum {}",
        membership.len(),
        membership.quorum()
    );
    for member in membership.members() {
        let marker = if *member == node_id { "*" } else { " " };
        println!("  {} {} {}", marker, member.to_hex(), config.member_name(member));
    }
    if let Some(update) = config.cluster_update()? {
        println!(
            "Scheduled update: {} members at {}",
            update.nodes.len(),
            update.activation_ms
        );
    }
    println!();
    println!("Contracts:");
    for contract in &config.contracts {
        println!("  {} ({})", contract.id, contract.kind);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Node { config } => {
            let node_config = load_config(&config)?;
            init_logging(cli.verbose, &node_config.logging);
            tracing::info!("Config: {:?}", config);
            run_node(node_config).await?;
        }

        Commands::Keygen { output, force } => {
            init_logging(cli.verbose, &LoggingConfig::default());
            keygen(&output, force)?;
        }

        Commands::Info { config } => {
            init_logging(cli.verbose, &LoggingConfig::default());
            info(&load_config(&config)?)?;
        }

        Commands::CheckConfig { config } => {
            init_logging(cli.verbose, &LoggingConfig::default());
            let node_config = load_config(&config)?;
            node_config.validate()?;
            println!(
                "{}: OK ({} members, {} contracts)",
                config.display(),
                node_config.cluster.members.len(),
                node_config.contracts.len()
            );
        }
    }

    Ok(())
}
