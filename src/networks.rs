//! Per-chain deployment parameters.
//!
//! The table is loaded once at startup (built-in defaults, or a JSON file named
//! by `NETWORKS_FILE`) and handed by reference to the bootstrapper and the
//! orchestrator. Fields are optional because the table also carries
//! placeholder entries; [`NetworkTable::deployment_params`] is the gate that
//! rejects an incomplete entry before anything touches the chain.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::DeployError;

/// Networks that run against a local development node with the mock coordinator.
pub const DEVELOPMENT_CHAINS: &[&str] = &["hardhat", "localhost"];

/// Confirmations awaited on public networks before a deployment counts as final.
pub const VERIFICATION_BLOCK_CONFIRMATIONS: u64 = 6;

/// 30 gwei key hash, shared by the local and Sepolia entries.
const GAS_LANE_30_GWEI: &str = "0x787d74caea10b2b357790d5b5247c2f63d1d91572a9846f780606e4d953677ae";

/// Deployment parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    /// Pre-existing VRF subscription (public networks).
    pub subscription_id: Option<u64>,
    /// Key hash selecting the gas price tier for fulfillment.
    pub gas_lane: Option<B256>,
    /// Minimum round duration in seconds.
    pub interval: Option<u64>,
    /// Entrance fee in wei.
    pub entrance_fee: Option<U256>,
    pub callback_gas_limit: Option<u32>,
    /// Live coordinator address (public networks).
    pub vrf_coordinator: Option<Address>,
    /// Block explorer base URL, used only for log output.
    pub explorer_url: Option<String>,
}

/// The subset of [`NetworkConfig`] every deployment needs, fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentParams {
    pub entrance_fee: U256,
    pub gas_lane: B256,
    pub callback_gas_limit: u32,
    pub interval: u64,
}

impl NetworkConfig {
    fn missing(&self, field: &'static str) -> DeployError {
        DeployError::MissingNetworkField {
            network: self.name.clone(),
            field,
        }
    }

    /// Return the deployment parameters, or the first absent field.
    pub fn deployment_params(&self) -> Result<DeploymentParams, DeployError> {
        Ok(DeploymentParams {
            entrance_fee: self.entrance_fee.ok_or_else(|| self.missing("entranceFee"))?,
            gas_lane: self.gas_lane.ok_or_else(|| self.missing("gasLane"))?,
            callback_gas_limit: self
                .callback_gas_limit
                .ok_or_else(|| self.missing("callbackGasLimit"))?,
            interval: self.interval.ok_or_else(|| self.missing("interval"))?,
        })
    }

    /// Coordinator and subscription of a live network.
    pub fn live_subscription(&self) -> Result<(Address, u64), DeployError> {
        let coordinator = self
            .vrf_coordinator
            .ok_or_else(|| self.missing("vrfCoordinatorV2"))?;
        let subscription_id = self
            .subscription_id
            .ok_or_else(|| self.missing("subscriptionId"))?;
        Ok((coordinator, subscription_id))
    }

    /// Explorer link for a deployed address, when the network has an explorer.
    pub fn explorer_address_url(&self, address: &Address) -> Option<String> {
        self.explorer_url
            .as_deref()
            .map(|base| format!("{}/address/{address}", base.trim_end_matches('/')))
    }
}

/// Immutable chain id -> [`NetworkConfig`] mapping.
#[derive(Debug, Clone)]
pub struct NetworkTable {
    entries: BTreeMap<u64, NetworkConfig>,
}

impl NetworkTable {
    /// Build a table from explicit entries.
    pub fn new(entries: impl IntoIterator<Item = (u64, NetworkConfig)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// The built-in table: local development, Sepolia, and a mainnet placeholder.
    ///
    /// The mainnet entry is deliberately incomplete; see
    /// [`NetworkTable::validate_deployable`].
    pub fn builtin() -> Self {
        let gas_lane = B256::from_str(GAS_LANE_30_GWEI).ok();
        let entrance_fee = parse_ether("0.01").ok();

        Self::new([
            (
                31337,
                NetworkConfig {
                    name: "localhost".into(),
                    subscription_id: Some(588),
                    gas_lane,
                    interval: Some(30),
                    entrance_fee,
                    callback_gas_limit: Some(500_000),
                    vrf_coordinator: None,
                    explorer_url: None,
                },
            ),
            (
                11155111,
                NetworkConfig {
                    name: "sepolia".into(),
                    subscription_id: Some(588),
                    gas_lane,
                    interval: Some(30),
                    entrance_fee,
                    callback_gas_limit: Some(500_000),
                    vrf_coordinator: Address::from_str("0x9ddfaca8183c41ad55329bdeed9f6a8d53168b1b")
                        .ok(),
                    explorer_url: Some("https://sepolia.etherscan.io".into()),
                },
            ),
            (
                1,
                NetworkConfig {
                    name: "mainnet".into(),
                    subscription_id: None,
                    gas_lane: None,
                    interval: Some(30),
                    entrance_fee: None,
                    callback_gas_limit: None,
                    vrf_coordinator: None,
                    explorer_url: Some("https://etherscan.io".into()),
                },
            ),
        ])
    }

    /// Load a table from a JSON file keyed by chain id.
    ///
    /// Numeric values may be written as strings, and `entranceFee` is an ether
    /// amount (`"0.01"`), matching how the values are usually handed around.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read network table {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid network table {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<u64, RawNetworkConfig> =
            serde_json::from_str(raw).context("failed to parse network table JSON")?;

        let mut entries = BTreeMap::new();
        for (chain_id, raw) in parsed {
            let config = raw
                .into_config()
                .with_context(|| format!("invalid entry for chain id {chain_id}"))?;
            entries.insert(chain_id, config);
        }
        Ok(Self { entries })
    }

    /// Look up the entry for `chain_id`.
    pub fn resolve(&self, chain_id: u64) -> Result<&NetworkConfig, DeployError> {
        self.entries
            .get(&chain_id)
            .ok_or(DeployError::UnknownNetwork(chain_id))
    }

    /// Resolve `chain_id` and require every deployment field to be present.
    pub fn deployment_params(&self, chain_id: u64) -> Result<DeploymentParams, DeployError> {
        self.resolve(chain_id)?.deployment_params()
    }

    /// Startup validation pass for a chain about to be deployed to.
    ///
    /// On public networks the live coordinator and subscription must also be
    /// present, because the bootstrapper reads them instead of creating a mock
    /// subscription.
    pub fn validate_deployable(&self, chain_id: u64, is_development: bool) -> Result<(), DeployError> {
        let config = self.resolve(chain_id)?;
        config.deployment_params()?;
        if !is_development {
            config.live_subscription()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNetworkConfig {
    name: String,
    subscription_id: Option<StringOrNumber>,
    gas_lane: Option<String>,
    interval: Option<StringOrNumber>,
    entrance_fee: Option<String>,
    callback_gas_limit: Option<StringOrNumber>,
    #[serde(alias = "vrfCoordinatorV2")]
    vrf_coordinator: Option<String>,
    explorer_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

impl StringOrNumber {
    fn parse<T>(&self, field: &str) -> Result<T>
    where
        T: FromStr + TryFrom<u64>,
        <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::String(s) => s
                .trim()
                .parse()
                .with_context(|| format!("`{field}` is not a valid number: {s}")),
            Self::Number(n) => T::try_from(*n)
                .map_err(|_| anyhow::anyhow!("`{field}` is out of range: {n}")),
        }
    }
}

impl RawNetworkConfig {
    fn into_config(self) -> Result<NetworkConfig> {
        let gas_lane = self
            .gas_lane
            .map(|s| B256::from_str(&s).with_context(|| format!("invalid gasLane: {s}")))
            .transpose()?;
        let entrance_fee = self
            .entrance_fee
            .map(|s| parse_ether(&s).with_context(|| format!("invalid entranceFee: {s}")))
            .transpose()?;
        let vrf_coordinator = self
            .vrf_coordinator
            .map(|s| Address::from_str(&s).with_context(|| format!("invalid vrfCoordinator: {s}")))
            .transpose()?;

        Ok(NetworkConfig {
            name: self.name,
            subscription_id: self
                .subscription_id
                .map(|v| v.parse("subscriptionId"))
                .transpose()?,
            gas_lane,
            interval: self.interval.map(|v| v.parse("interval")).transpose()?,
            entrance_fee,
            callback_gas_limit: self
                .callback_gas_limit
                .map(|v| v.parse("callbackGasLimit"))
                .transpose()?,
            vrf_coordinator,
            explorer_url: self.explorer_url,
        })
    }
}

/// Networks selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum NetworkName {
    /// Ephemeral node spawned for the duration of the run.
    Hardhat,
    /// Long-running development node.
    Localhost,
    Sepolia,
}

impl NetworkName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardhat => "hardhat",
            Self::Localhost => "localhost",
            Self::Sepolia => "sepolia",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Hardhat | Self::Localhost => 31337,
            Self::Sepolia => 11155111,
        }
    }

    pub fn is_development(&self) -> bool {
        DEVELOPMENT_CHAINS.contains(&self.as_str())
    }

    /// Deployments on the ephemeral network are not written to disk.
    pub fn persists_deployments(&self) -> bool {
        !matches!(self, Self::Hardhat)
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
