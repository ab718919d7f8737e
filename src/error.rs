//! Error taxonomy for deployment and bootstrap.
//!
//! Configuration errors ([`DeployError::UnknownNetwork`],
//! [`DeployError::MissingNetworkField`]) are raised before any transaction is
//! sent. [`DeployError::VerificationFailed`] is the only non-fatal variant;
//! the orchestrator logs it and carries on.

use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Failures surfaced by the chain collaborator.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport or node-level failure.
    #[error("chain rpc error: {0}")]
    Rpc(String),
    /// The transaction or call reverted on-chain.
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// The mock coordinator has no record of this request id.
    #[error("nonexistent request {0}")]
    NonexistentRequest(U256),
    /// A mined receipt lacked a field the caller relies on.
    #[error("receipt is missing {0}")]
    MissingReceiptField(&'static str),
}

impl ChainError {
    /// Returns true if the failure came from an on-chain revert, as opposed to
    /// a transport problem.
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Reverted(_) | Self::NonexistentRequest(_))
    }
}

/// Errors raised while resolving, bootstrapping, deploying or verifying.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no network parameters registered for chain id {0}")]
    UnknownNetwork(u64),

    #[error("network `{network}` is missing required field `{field}`")]
    MissingNetworkField { network: String, field: &'static str },

    #[error("no VRFCoordinatorV2Mock deployment recorded for network `{0}`")]
    MockCoordinatorUnavailable(String),

    #[error("createSubscription receipt from {coordinator} carried no SubscriptionCreated log")]
    SubscriptionCreationFailed { coordinator: Address },

    #[error("source verification failed: {0}")]
    VerificationFailed(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("deployment store error: {0}")]
    Store(String),
}
