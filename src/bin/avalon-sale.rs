//! AVALON sale command line
//!
//! Loads `.env`, resolves configuration, installs logging and runs one
//! subcommand against the JSON-RPC wallet provider.

use anyhow::{bail, Context, Result};
use avalon_sale_sdk::config::known_networks;
use avalon_sale_sdk::{
    Amount, EngineView, EnvironmentConfig, Error, SaleClient, SaleClientBuilder, SaleConfig,
};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// AVALON token sale
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "avalon-sale")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the wallet and the sale tiers
    Status,

    /// Request wallet access and show the result
    Connect,

    /// Preview, confirm and submit a contribution
    Contribute {
        /// Tier to contribute to
        #[arg(long, default_value = "A")]
        tier: String,

        /// Native amount; defaults to the minimum contribution
        #[arg(long)]
        amount: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List known networks
    Networks,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let env_config = EnvironmentConfig::load().context("Failed to load configuration")?;
    init_logging(&env_config.get_log_level());

    match cli.command {
        Command::Networks => print_networks(),
        Command::Status => {
            let client = build_client(&env_config)?;
            client.probe().await;
            print_view(&client.view());
        }
        Command::Connect => {
            let client = build_client(&env_config)?;
            client.connect().await?;
            print_view(&client.view());
        }
        Command::Contribute { tier, amount, yes } => {
            let client = build_client(&env_config)?;
            contribute(&client, &tier, amount.as_deref(), yes).await?;
        }
    }
    Ok(())
}

fn build_client(env_config: &EnvironmentConfig) -> Result<SaleClient> {
    let config = SaleConfig::from_env_config(env_config)?;
    SaleClientBuilder::new()
        .with_config(config)
        .build()
        .context("Failed to build sale client")
}

fn init_logging(configured_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn contribute(client: &SaleClient, tier: &str, amount: Option<&str>, yes: bool) -> Result<()> {
    if client.probe().await.is_none() {
        client.connect().await?;
    }

    let requested = amount
        .map(|amount| amount.parse::<Amount>())
        .transpose()
        .context("Invalid amount")?;
    let pending = client.preview(tier, requested).await?;
    let view = client.view();
    let reward_asset = view
        .tiers
        .iter()
        .find(|t| t.tier_id == pending.tier_id)
        .map(|t| t.reward_asset.clone())
        .unwrap_or_default();

    println!(
        "Contribute {} {} to Tranche {} for about {} {}",
        pending.native_amount, view.native_symbol, pending.tier_id, pending.estimated_reward_amount, reward_asset
    );

    if !yes && !confirm("Proceed? [y/N] ")? {
        client.cancel().await?;
        println!("Cancelled");
        return Ok(());
    }

    let tx_hash = client.confirm_and_submit().await?;
    println!("Submitted: {:#x}", tx_hash);
    println!("Waiting for confirmation...");

    match client.await_finality().await {
        Ok(outcome) => {
            if let Some(notice) = client.view().notice {
                println!("{}", notice.message);
            }
            if let Some(block) = outcome.block_number {
                println!("Block: {}", block);
            }
            if !outcome.view_refreshed {
                println!("Sale figures could not be refreshed; run `status` again");
            }
            print_view(&client.view());
            Ok(())
        }
        Err(e @ Error::OutcomeUncertain { .. }) => {
            bail!("{}", e.notice().unwrap_or_else(|| e.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_view(view: &EngineView) {
    println!("{}", view.connect_label);
    if let (Some(address), Some(network)) = (&view.short_address, &view.network_name) {
        println!("  {} on {}", address, network);
        println!("  Balance: {}", view.balance_display);
    }
    if let Some(reward_balance) = view.reward_balance {
        println!("  Reward balance: {}", reward_balance);
    }
    println!();

    for tier in &view.tiers {
        println!("{} [{}]", tier.name, tier.status);
        println!("  Min contribution: {}", tier.min_contribution_display);
        if let Some(tokens) = tier.tokens_for_min_contribution {
            println!("  Tokens for min:   {} {}", tokens, tier.reward_asset);
        }
        println!("  Cap / available:  {}", tier.cap_display);
        println!("  Progress:         {}%", tier.progress_percent);
        println!("  {}", tier.action_label);
    }

    if let Some(notice) = &view.notice {
        println!();
        println!("{}", notice.message);
    }
}

fn print_networks() {
    let mut networks: Vec<(u64, &str)> = known_networks().collect();
    networks.sort_by_key(|(chain_id, _)| *chain_id);
    for (chain_id, name) in networks {
        println!("{:>10}  {}", chain_id, name);
    }
}
