//! Named deployment records per network.
//!
//! Records for the ephemeral `hardhat` network live only in memory. Every
//! other network writes `<root>/<network>/<Name>.json` so later runs (and the
//! `enter` command) can find what was deployed.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::DeployError;

/// What a deployment left behind on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    #[serde(rename = "address")]
    pub contract_address: Address,
    /// Constructor arguments in declaration order.
    #[serde(rename = "args")]
    pub constructor_args: Vec<String>,
    pub confirmations_waited: u64,
    pub transaction_hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

#[derive(Debug)]
pub struct Deployments {
    network: String,
    dir: Option<PathBuf>,
    records: BTreeMap<String, DeploymentRecord>,
}

impl Deployments {
    /// A store that forgets everything when dropped.
    pub fn in_memory(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            dir: None,
            records: BTreeMap::new(),
        }
    }

    /// Open (and load) `<root>/<network>/`.
    pub fn on_disk(root: &Path, network: impl Into<String>) -> Result<Self, DeployError> {
        let network = network.into();
        let dir = root.join(&network);
        let mut records = BTreeMap::new();

        if dir.is_dir() {
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| DeployError::Store(format!("cannot read {}: {e}", dir.display())))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_none_or(|ext| ext != "json") {
                    continue;
                }
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| DeployError::Store(format!("cannot read {}: {e}", path.display())))?;
                let record: DeploymentRecord = serde_json::from_str(&raw)
                    .map_err(|e| DeployError::Store(format!("{}: {e}", path.display())))?;
                records.insert(name.to_string(), record);
            }
            debug!(network = %network, count = records.len(), "Loaded deployment records");
        }

        Ok(Self {
            network,
            dir: Some(dir),
            records,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.get(name)
    }

    /// Record `name`, replacing any previous record with that name.
    pub fn save(&mut self, name: &str, record: DeploymentRecord) -> Result<(), DeployError> {
        if let Some(dir) = &self.dir {
            std::fs::create_dir_all(dir)
                .map_err(|e| DeployError::Store(format!("cannot create {}: {e}", dir.display())))?;
            let path = dir.join(format!("{name}.json"));
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| DeployError::Store(e.to_string()))?;
            std::fs::write(&path, json)
                .map_err(|e| DeployError::Store(format!("cannot write {}: {e}", path.display())))?;
            info!(name, path = %path.display(), "Saved deployment");
        }
        self.records.insert(name.to_string(), record);
        Ok(())
    }
}
