use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_core::{Blockchain, CancellationToken, ChainConfig, KeyValueStore};
use ledger_storage::SledStore;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger")]
#[command(about = "Drive a local proof-of-work ledger stored in sled")]
struct Cli {
    /// Data directory for sled
    #[arg(long, default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// TOML file with chain settings (difficulty, timeouts)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured difficulty
    #[arg(long, global = true)]
    difficulty: Option<usize>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the genesis block if the chain is empty
    Init,
    /// Show the block count and the last height
    Height,
    /// Mine a new block carrying BODY
    Add { body: String },
    /// Print the block at HEIGHT
    Get { height: u64 },
    /// Re-derive the hash of the block at HEIGHT
    ValidateBlock { height: u64 },
    /// Check every block and every link
    ValidateChain,
    /// Overwrite the stored body at HEIGHT without resealing the block
    Tamper { height: u64, body: String },
    /// Append test blocks one after another, then validate the chain
    Demo {
        #[arg(long, default_value_t = 10)]
        blocks: u64,
    },
}

#[derive(Serialize)]
struct HeightReport {
    block_count: u64,
    last_height: Option<u64>,
}

#[derive(Serialize)]
struct ChainReport {
    valid: bool,
    invalid_heights: Vec<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.difficulty)?;
    let store = Arc::new(
        SledStore::open(&cli.data_dir)
            .with_context(|| format!("opening store at {}", cli.data_dir.display()))?,
    );
    let chain = Blockchain::open(store.clone(), config).await?;

    run(&chain, cli.cmd).await?;
    store.close()?;
    Ok(())
}

async fn run<S: KeyValueStore + 'static>(chain: &Blockchain<S>, cmd: Command) -> Result<()> {
    match cmd {
        // `Blockchain::open` already wrote the genesis block when needed.
        Command::Init => print_json(&chain.get_block(0).await?)?,
        Command::Height => print_json(&HeightReport {
            block_count: chain.block_count().await?,
            last_height: chain.last_height().await?,
        })?,
        Command::Add { body } => {
            let height = chain.add_block_with_cancel(body, cancel_on_ctrl_c()).await?;
            print_json(&chain.get_block(height).await?)?;
        }
        Command::Get { height } => print_json(&chain.get_block(height).await?)?,
        Command::ValidateBlock { height } => {
            let validation = chain.validate_block(height).await?;
            println!(
                "block {height} is {}",
                if validation.is_valid { "valid" } else { "invalid" }
            );
        }
        Command::ValidateChain => {
            let invalid_heights = chain.validate_chain().await?;
            print_json(&ChainReport {
                valid: invalid_heights.is_empty(),
                invalid_heights,
            })?;
        }
        Command::Tamper { height, body } => {
            tamper(chain, height, body).await?;
            warn!(height, "tampered with stored block");
        }
        Command::Demo { blocks } => {
            let cancel = cancel_on_ctrl_c();
            for i in 0..blocks {
                let height = chain
                    .add_block_with_cancel(format!("Test Block - {}", i + 1), cancel.clone())
                    .await?;
                info!(height, "demo block appended");
            }
            let invalid_heights = chain.validate_chain().await?;
            print_json(&ChainReport {
                valid: invalid_heights.is_empty(),
                invalid_heights,
            })?;
        }
    }
    Ok(())
}

/// Defaults, then the TOML file, then the command-line override.
fn load_config(path: Option<&Path>, difficulty: Option<usize>) -> Result<ChainConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str::<ChainConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ChainConfig::default(),
    };
    if let Some(difficulty) = difficulty {
        config.difficulty = difficulty;
    }
    config.validate()?;
    Ok(config)
}

/// Rewrite the body stored at `height` while keeping its old hash, so the
/// validators have something to find.
async fn tamper<S: KeyValueStore + 'static>(
    chain: &Blockchain<S>,
    height: u64,
    body: String,
) -> Result<()> {
    let mut block = chain.get_block(height).await?;
    block.body = body;
    chain.store().put(height, block.to_bytes()?).await?;
    chain.store().flush().await?;
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping nonce search");
            on_signal.cancel();
        }
    });
    token
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
