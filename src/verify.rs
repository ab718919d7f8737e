//! Source verification against an Etherscan-compatible explorer API.
//!
//! Verification is a two-step exchange: submit the standard JSON input and
//! receive a GUID, then poll `checkverifystatus` until the explorer reports a
//! verdict or the poll budget runs out.

use alloy::primitives::{hex, Address};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactStore, VerificationInput};
use crate::config::{AppConfig, Secret};
use crate::contracts::{ConstructorArgs, RAFFLE};
use crate::error::DeployError;

/// HTTP request timeout for explorer calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Verifies deployed source on a block explorer.
pub trait SourceVerifier {
    async fn verify(&self, address: Address, args: &ConstructorArgs) -> Result<(), DeployError>;
}

#[derive(Deserialize, Debug)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Queued(String),
    AlreadyVerified,
}

#[derive(Debug, PartialEq, Eq)]
enum VerificationStatus {
    Verified,
    Pending,
    Failed(String),
}

fn is_already_verified(result: &str) -> bool {
    result.to_ascii_lowercase().contains("already verified")
}

/// The request URL carries the API key, so it is stripped before the error
/// can reach a log line.
fn request_failed(stage: &str, e: reqwest::Error) -> DeployError {
    DeployError::VerificationFailed(format!("{stage} failed: {}", e.without_url()))
}

fn interpret_submission(resp: EtherscanResponse) -> Result<Submission, DeployError> {
    if resp.status == "1" {
        return Ok(Submission::Queued(resp.result));
    }
    if is_already_verified(&resp.result) {
        return Ok(Submission::AlreadyVerified);
    }
    Err(DeployError::VerificationFailed(format!(
        "submission rejected ({}): {}",
        resp.message, resp.result
    )))
}

fn interpret_status(resp: EtherscanResponse) -> VerificationStatus {
    let result = resp.result.as_str();
    if result.starts_with("Pass") || is_already_verified(result) {
        VerificationStatus::Verified
    } else if result.contains("Pending") || result.contains("in queue") {
        VerificationStatus::Pending
    } else if resp.status == "1" {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Failed(resp.result)
    }
}

/// Client for the Etherscan v2 contract verification API.
pub struct EtherscanVerifier {
    http: reqwest::Client,
    api_url: String,
    api_key: Secret,
    chain_id: u64,
    input: VerificationInput,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl EtherscanVerifier {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Secret,
        chain_id: u64,
        input: VerificationInput,
    ) -> Result<Self, DeployError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| DeployError::VerificationFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key,
            chain_id,
            input,
            poll_attempts: 10,
            poll_interval: Duration::from_secs(3),
        })
    }

    /// Build a verifier for the raffle when an explorer credential is
    /// configured.
    ///
    /// Returns `None` without a credential, and also when the build metadata
    /// cannot be loaded: verification never blocks a deployment.
    pub fn from_config(config: &AppConfig, chain_id: u64, artifacts: &ArtifactStore) -> Option<Self> {
        let Some(api_key) = config.etherscan_api_key.clone() else {
            info!("ETHERSCAN_API_KEY not set, source verification disabled");
            return None;
        };

        let built = artifacts
            .load(RAFFLE)
            .and_then(|artifact| artifacts.verification_input(&artifact))
            .and_then(|input| Self::new(config.etherscan_api_url.clone(), api_key, chain_id, input));

        match built {
            Ok(mut verifier) => {
                verifier.poll_attempts = config.verify_poll_attempts;
                verifier.poll_interval = config.verify_poll_interval;
                Some(verifier)
            }
            Err(e) => {
                warn!(error = %e, "Source verification disabled, deploying without it");
                None
            }
        }
    }

    async fn submit(&self, address: Address, args: &ConstructorArgs) -> Result<Submission, DeployError> {
        let source = serde_json::to_string(&self.input.standard_json)
            .map_err(|e| DeployError::VerificationFailed(e.to_string()))?;
        let chain_id = self.chain_id.to_string();
        let address = address.to_string();
        let compiler_version = format!("v{}", self.input.compiler_version);
        let encoded_args = hex::encode(args.abi_encode());

        let form = [
            ("apikey", self.api_key.expose()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", self.input.fully_qualified_name.as_str()),
            ("compilerversion", compiler_version.as_str()),
            // Field name as spelled by the explorer API.
            ("constructorArguements", encoded_args.as_str()),
        ];

        let resp: EtherscanResponse = self
            .http
            .post(&self.api_url)
            .query(&[("chainid", chain_id.as_str())])
            .form(&form)
            .send()
            .await
            .map_err(|e| request_failed("submission request", e))?
            .json()
            .await
            .map_err(|e| request_failed("submission response", e))?;

        interpret_submission(resp)
    }

    async fn check_status(&self, guid: &str) -> Result<VerificationStatus, DeployError> {
        let chain_id = self.chain_id.to_string();
        let resp: EtherscanResponse = self
            .http
            .get(&self.api_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("apikey", self.api_key.expose()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .map_err(|e| request_failed("status request", e))?
            .json()
            .await
            .map_err(|e| request_failed("status response", e))?;

        Ok(interpret_status(resp))
    }
}

impl SourceVerifier for EtherscanVerifier {
    async fn verify(&self, address: Address, args: &ConstructorArgs) -> Result<(), DeployError> {
        let guid = match self.submit(address, args).await? {
            Submission::AlreadyVerified => {
                info!(address = %address, "Contract source already verified");
                return Ok(());
            }
            Submission::Queued(guid) => guid,
        };
        debug!(guid = %guid, "Verification submitted");

        for attempt in 1..=self.poll_attempts {
            tokio::time::sleep(self.poll_interval).await;
            match self.check_status(&guid).await? {
                VerificationStatus::Verified => {
                    info!(address = %address, "Contract source verified");
                    return Ok(());
                }
                VerificationStatus::Pending => {
                    debug!(attempt, "Verification pending");
                }
                VerificationStatus::Failed(reason) => {
                    return Err(DeployError::VerificationFailed(reason));
                }
            }
        }

        warn!(guid = %guid, attempts = self.poll_attempts, "Verification still pending");
        Err(DeployError::VerificationFailed(format!(
            "no verdict after {} status checks (guid {guid})",
            self.poll_attempts
        )))
    }
}
