//! Raffle deployment and test tooling.
//!
//! - **deploy**: deploys the VRF coordinator mock (development networks) and
//!   the raffle, bootstrapping a VRF subscription and verifying source on
//!   public networks.
//! - **test**: runs the behavioural scenarios against fresh deployments on a
//!   development network.
//! - **enter**: enters the recorded raffle from the deployer account.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod artifacts;
mod bootstrap;
mod chain;
mod config;
mod contracts;
mod deploy;
mod deployments;
mod error;
mod evm;
mod harness;
mod networks;
#[cfg(test)]
mod sim;
mod verify;

use chain::{Chain, RaffleContract};
use config::AppConfig;
use contracts::RAFFLE;
use deploy::{DeployTag, Orchestrator, selects_raffle};
use deployments::Deployments;
use evm::EvmChain;
use networks::NetworkName;
use verify::EtherscanVerifier;

#[derive(Parser, Debug)]
#[command(name = "raffle-deploy", version, about = "Deploy and exercise the VRF raffle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy the selected steps to a network.
    Deploy {
        #[arg(long, value_enum, default_value = "hardhat")]
        network: NetworkName,
        /// Steps to run, by tag.
        #[arg(long, value_enum, value_delimiter = ',', default_value = "all")]
        tags: Vec<DeployTag>,
    },
    /// Run the raffle scenarios on a development network.
    Test {
        #[arg(long, value_enum, default_value = "hardhat")]
        network: NetworkName,
    },
    /// Enter the deployed raffle from the deployer account, paying the entrance fee.
    Enter {
        #[arg(long, value_enum, default_value = "localhost")]
        network: NetworkName,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,alloy=warn,hyper=warn,reqwest=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;
    let table = config.load_network_table()?;

    match cli.command {
        Command::Deploy { network, tags } => deploy(&config, &table, network, &tags).await,
        Command::Test { network } => test(&config, &table, network).await,
        Command::Enter { network } => enter(&config, network).await,
    }
}

async fn deploy(
    config: &AppConfig,
    table: &networks::NetworkTable,
    network: NetworkName,
    tags: &[DeployTag],
) -> Result<()> {
    let chain_id = network.chain_id();
    let is_development = network.is_development();

    if selects_raffle(tags) {
        table
            .validate_deployable(chain_id, is_development)
            .with_context(|| format!("network table is not deployable for {network}"))?;
    }

    let chain = EvmChain::connect(config, network).await?;
    let mut deployments = if network.persists_deployments() {
        Deployments::on_disk(&config.deployments_dir, network.as_str())?
    } else {
        Deployments::in_memory(network.as_str())
    };

    let verifier = if is_development {
        None
    } else {
        EtherscanVerifier::from_config(config, chain_id, chain.artifacts())
    };

    let summary = Orchestrator::new(&chain, table, verifier.as_ref())
        .run_tags(chain_id, is_development, tags, &mut deployments)
        .await
        .with_context(|| format!("deployment to {network} failed"))?;

    if let Some(mock) = &summary.mock {
        info!(address = %mock.contract_address, "Mocks deployed");
    }
    if let Some(raffle) = summary.raffle {
        if let Some(subscription) = raffle.subscription {
            info!(
                subscription_id = subscription.subscription_id,
                funded = %subscription.funded_amount,
                "Subscription created for this deployment"
            );
        }
        info!(address = %raffle.record.contract_address, "{RAFFLE} ready");
        let hint = match network {
            NetworkName::Hardhat => NetworkName::Localhost,
            other => other,
        };
        info!("Run this contract with: raffle-deploy enter --network {hint}");
        if !network.persists_deployments() {
            warn!("{network} deployments are discarded on exit; deploy to localhost to keep them");
        }
    }
    Ok(())
}

async fn test(config: &AppConfig, table: &networks::NetworkTable, network: NetworkName) -> Result<()> {
    if !network.is_development() {
        info!(network = %network, "Scenarios only run on development networks, skipping");
        return Ok(());
    }

    let chain = EvmChain::connect(config, network).await?;
    let report =
        harness::run_scenarios(&chain, table, network.chain_id(), config.fulfillment_timeout).await;

    info!(passed = report.passed, failed = report.failed.len(), "Scenarios finished");
    if !report.is_success() {
        for (scenario, error) in &report.failed {
            warn!(scenario = %scenario, error = %error, "Failed");
        }
        bail!("{} of {} scenarios failed", report.failed.len(), harness::Scenario::ALL.len());
    }
    Ok(())
}

async fn enter(config: &AppConfig, network: NetworkName) -> Result<()> {
    if !network.persists_deployments() {
        bail!("{network} deployments are not persisted; deploy to localhost and enter there");
    }

    let deployments = Deployments::on_disk(&config.deployments_dir, network.as_str())?;
    let record = deployments
        .get(RAFFLE)
        .with_context(|| format!("no {RAFFLE} deployment recorded for {network}"))?;

    let chain = EvmChain::connect(config, network).await?;
    let player = chain.deployer();

    let raffle = chain.raffle_at(record.contract_address);
    let fee = raffle.entrance_fee().await?;
    raffle
        .enter(player, fee)
        .await
        .context("enterRaffle failed")?;

    let players = raffle.number_of_players().await?;
    info!(raffle = %raffle.address(), player = %player, fee = %fee, players = %players, "Entered!");
    Ok(())
}
