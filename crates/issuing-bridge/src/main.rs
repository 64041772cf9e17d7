//! Issuing Bridge Binary
//!
//! Command-line interface for listing bridge tokens, registering tokens on the
//! backing contract and moving tokens across the bridge.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use ethers::signers::LocalWallet;
use ethers::types::U256;
use issuing_bridge::config::BridgeConfig;
use issuing_bridge::coordinator::parse_address;
use issuing_bridge::IssuingBridge;
use issuing_types::{Chain, Direction};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "issuing-bridge")]
#[command(about = "ERC-20 issuing bridge client")]
struct Args {
    /// Path to the bridge configuration file
    #[arg(long, default_value = "bridge.toml")]
    config: PathBuf,

    /// Private key used to sign transactions
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// RPC endpoint the wallet reports its network from
    #[arg(long)]
    wallet_rpc: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tokens known to the bridge with the wallet's balances
    Tokens {
        /// source (backing) or destination (mapping)
        #[arg(long, default_value = "source")]
        chain: Chain,
    },
    /// Show the registration status of a token
    Status { address: String },
    /// Register a token and wait for its registration proof
    Register {
        address: String,

        /// Submit the proof to the backing contract once acquired
        #[arg(long)]
        confirm: bool,
    },
    /// Wait for the registration proof of an already submitted token
    Proof { address: String },
    /// Send tokens across the bridge
    Send {
        /// s2d or d2s
        #[arg(long)]
        direction: Direction,

        #[arg(long)]
        token: String,

        #[arg(long)]
        recipient: String,

        /// Amount in the token's smallest unit
        #[arg(long)]
        amount: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = BridgeConfig::load(&args.config)?;
    let signer: LocalWallet = args
        .private_key
        .parse()
        .context("invalid private key")?;
    let bridge = IssuingBridge::connect(&config, signer, args.wallet_rpc.as_deref())?;

    match args.command {
        Commands::Tokens { chain } => {
            let tokens = bridge.tokens(chain).await?;
            print_json(&tokens)
        }
        Commands::Status { address } => {
            let status = bridge.coordinator().status(&address).await?;
            print_json(&status)
        }
        Commands::Register { address, confirm } => {
            let Some(subscription) = bridge.coordinator().register(&address).await? else {
                info!(%address, "token is already registered");
                return Ok(());
            };
            info!(%address, "waiting for registration proof");
            let event = subscription.wait().await?;
            print_json(&event)?;

            if confirm {
                let tx_hash = bridge.coordinator().confirm(&event).await?;
                info!(?tx_hash, "registration confirmed");
            }
            Ok(())
        }
        Commands::Proof { address } => {
            let token =
                parse_address(&address).ok_or_else(|| anyhow!("invalid address: {}", address))?;
            let event = bridge.monitor().watch(token)?.wait().await?;
            print_json(&event)
        }
        Commands::Send {
            direction,
            token,
            recipient,
            amount,
        } => {
            let token =
                parse_address(&token).ok_or_else(|| anyhow!("invalid token address: {}", token))?;
            let recipient = parse_address(&recipient)
                .ok_or_else(|| anyhow!("invalid recipient address: {}", recipient))?;
            let amount = U256::from_dec_str(&amount).context("invalid amount")?;

            let tx_hash = bridge
                .coordinator()
                .cross_send(direction, token, recipient, amount)
                .await?;
            info!(?tx_hash, %direction, "cross-chain transfer submitted");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
