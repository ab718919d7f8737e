//! Application configuration loaded from environment variables.
//!
//! Secrets: `SEPOLIA_RPC_URL`, `PRIVATE_KEY`, `ETHERSCAN_API_KEY` (required
//! only for the networks that use them).
//! Optional: `LOCALHOST_RPC_URL`, `ETHERSCAN_API_URL`, `ARTIFACTS_DIR`,
//!           `DEPLOYMENTS_DIR`, `NETWORKS_FILE`, `FULFILLMENT_TIMEOUT_SECS`,
//!           `VERIFY_POLL_ATTEMPTS`, `VERIFY_POLL_INTERVAL_MS`

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::networks::NetworkTable;

/// A value that must never reach logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Configuration for deployment and test runs.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// JSON-RPC endpoint of the long-running development node.
    pub localhost_rpc_url: String,
    /// Sepolia JSON-RPC endpoint. Usually embeds a provider API key.
    pub sepolia_rpc_url: Option<Secret>,
    /// Hex private key of the public-network deployer.
    pub private_key: Option<Secret>,
    /// Block explorer credential; verification is skipped without it.
    pub etherscan_api_key: Option<Secret>,
    /// Etherscan-compatible API endpoint.
    pub etherscan_api_url: String,
    /// Root of the compiled contract artifacts.
    pub artifacts_dir: PathBuf,
    /// Root of the persisted deployment records.
    pub deployments_dir: PathBuf,
    /// Optional JSON replacement for the built-in network table.
    pub networks_file: Option<PathBuf>,
    /// Upper bound on waiting for `WinnerPicked` after fulfillment.
    pub fulfillment_timeout: Duration,
    /// Number of status polls after submitting a verification.
    pub verify_poll_attempts: u32,
    /// Delay between verification status polls.
    pub verify_poll_interval: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secret = |key: &str| var(key).map(Secret);
        let path = |key: &str, default: &str| {
            let raw = var(key).unwrap_or_else(|| default.into());
            PathBuf::from(shellexpand::tilde(&raw).to_string())
        };

        let localhost_rpc_url =
            var("LOCALHOST_RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8545".into());

        let etherscan_api_url =
            var("ETHERSCAN_API_URL").unwrap_or_else(|| "https://api.etherscan.io/v2/api".into());

        let networks_file = var("NETWORKS_FILE")
            .map(|raw| PathBuf::from(shellexpand::tilde(&raw).to_string()));

        let fulfillment_timeout_secs: u64 = var("FULFILLMENT_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);

        let verify_poll_attempts = var("VERIFY_POLL_ATTEMPTS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let verify_poll_interval_ms: u64 = var("VERIFY_POLL_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3_000);

        Ok(Self {
            localhost_rpc_url,
            sepolia_rpc_url: secret("SEPOLIA_RPC_URL"),
            private_key: secret("PRIVATE_KEY"),
            etherscan_api_key: secret("ETHERSCAN_API_KEY"),
            etherscan_api_url,
            artifacts_dir: path("ARTIFACTS_DIR", "artifacts"),
            deployments_dir: path("DEPLOYMENTS_DIR", "deployments"),
            networks_file,
            fulfillment_timeout: Duration::from_secs(fulfillment_timeout_secs),
            verify_poll_attempts,
            verify_poll_interval: Duration::from_millis(verify_poll_interval_ms),
        })
    }

    /// The network table for this run: `NETWORKS_FILE` if set, else built-in.
    pub fn load_network_table(&self) -> Result<NetworkTable> {
        match &self.networks_file {
            Some(path) => NetworkTable::from_json_file(path),
            None => Ok(NetworkTable::builtin()),
        }
    }
}
