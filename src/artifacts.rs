//! Compiled contract artifacts in the Hardhat layout.
//!
//! ```text
//! artifacts/
//!   contracts/Raffle.sol/Raffle.json        abi + creation bytecode
//!   contracts/Raffle.sol/Raffle.dbg.json    pointer to the build-info file
//!   build-info/<hash>.json                  solc standard JSON input + version
//! ```

use alloy::primitives::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::DeployError;

/// A deployable contract artifact.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub bytecode: Bytes,
    path: PathBuf,
}

impl ContractArtifact {
    /// `source:Name`, as block explorers expect it.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }
}

/// Everything a source verifier needs to rebuild the bytecode.
#[derive(Debug, Clone)]
pub struct VerificationInput {
    pub fully_qualified_name: String,
    /// Long compiler version without the leading `v`, e.g. `0.8.24+commit.e11b9ed9`.
    pub compiler_version: String,
    /// The solc standard JSON input used for the build.
    pub standard_json: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: String,
    source_name: String,
    bytecode: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: serde_json::Value,
}

/// Locates artifacts under a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact for contract `name`.
    pub fn load(&self, name: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.find(name)?;
        let raw = read(&path)?;
        let artifact: HardhatArtifact = serde_json::from_str(&raw)
            .map_err(|e| DeployError::Artifact(format!("{}: {e}", path.display())))?;

        let bytecode = Bytes::from_str(&artifact.bytecode)
            .map_err(|e| DeployError::Artifact(format!("{}: invalid bytecode: {e}", path.display())))?;
        if bytecode.is_empty() {
            return Err(DeployError::Artifact(format!(
                "{} has no creation bytecode (abstract contract or interface?)",
                artifact.contract_name
            )));
        }

        debug!(contract = %artifact.contract_name, path = %path.display(), "Loaded artifact");

        Ok(ContractArtifact {
            contract_name: artifact.contract_name,
            source_name: artifact.source_name,
            bytecode,
            path,
        })
    }

    /// Resolve the build-info behind `artifact`.
    pub fn verification_input(&self, artifact: &ContractArtifact) -> Result<VerificationInput, DeployError> {
        let dbg_path = artifact.path.with_extension("dbg.json");
        let dbg: DebugFile = serde_json::from_str(&read(&dbg_path)?)
            .map_err(|e| DeployError::Artifact(format!("{}: {e}", dbg_path.display())))?;

        let parent = dbg_path.parent().unwrap_or(Path::new("."));
        let build_info_path = parent.join(&dbg.build_info);
        let build_info: BuildInfo = serde_json::from_str(&read(&build_info_path)?)
            .map_err(|e| DeployError::Artifact(format!("{}: {e}", build_info_path.display())))?;

        Ok(VerificationInput {
            fully_qualified_name: artifact.fully_qualified_name(),
            compiler_version: build_info.solc_long_version,
            standard_json: build_info.input,
        })
    }

    /// Find `<Name>.sol/<Name>.json` anywhere below the root.
    fn find(&self, name: &str) -> Result<PathBuf, DeployError> {
        let file_name = format!("{name}.json");
        let dir_name = format!("{name}.sol");
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| DeployError::Artifact(format!("cannot read {}: {e}", dir.display())))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    if path.file_name().is_some_and(|n| n != "build-info") {
                        pending.push(path);
                    }
                } else if path.file_name().is_some_and(|n| n == file_name.as_str())
                    && path
                        .parent()
                        .and_then(Path::file_name)
                        .is_some_and(|n| n == dir_name.as_str())
                {
                    return Ok(path);
                }
            }
        }

        Err(DeployError::Artifact(format!(
            "no artifact for {name} under {}; compile the contracts first",
            self.root.display()
        )))
    }
}

fn read(path: &Path) -> Result<String, DeployError> {
    std::fs::read_to_string(path)
        .map_err(|e| DeployError::Artifact(format!("cannot read {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_raffle_artifacts(root: &Path, bytecode: &str) {
        let dir = root.join("contracts/Raffle.sol");
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(root.join("build-info")).unwrap();
        fs::write(
            dir.join("Raffle.json"),
            format!(
                r#"{{"contractName":"Raffle","sourceName":"contracts/Raffle.sol","abi":[],"bytecode":"{bytecode}"}}"#
            ),
        )
        .unwrap();
        fs::write(
            dir.join("Raffle.dbg.json"),
            r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/abc123.json"}"#,
        )
        .unwrap();
        fs::write(
            root.join("build-info/abc123.json"),
            r#"{"solcLongVersion":"0.8.24+commit.e11b9ed9","input":{"language":"Solidity","sources":{}}}"#,
        )
        .unwrap();
    }

    #[test]
    fn loads_nested_artifact_and_build_info() {
        let tmp = tempfile::tempdir().unwrap();
        write_raffle_artifacts(tmp.path(), "0x6080604052");

        let store = ArtifactStore::new(tmp.path());
        let artifact = store.load("Raffle").unwrap();
        assert_eq!(artifact.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(artifact.fully_qualified_name(), "contracts/Raffle.sol:Raffle");

        let input = store.verification_input(&artifact).unwrap();
        assert_eq!(input.compiler_version, "0.8.24+commit.e11b9ed9");
        assert_eq!(input.standard_json["language"], "Solidity");
    }

    #[test]
    fn missing_artifact_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArtifactStore::new(tmp.path()).load("Raffle").unwrap_err();
        assert!(matches!(err, DeployError::Artifact(msg) if msg.contains("no artifact for Raffle")));
    }

    #[test]
    fn interface_without_bytecode_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_raffle_artifacts(tmp.path(), "0x");
        let err = ArtifactStore::new(tmp.path()).load("Raffle").unwrap_err();
        assert!(matches!(err, DeployError::Artifact(msg) if msg.contains("no creation bytecode")));
    }
}
