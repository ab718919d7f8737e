//! Seams to the chain: the node, the coordinator, and the raffle contract.
//!
//! [`crate::evm::EvmChain`] implements these over JSON-RPC. Tests use an
//! in-process double so the bootstrap and deployment sequencing can run
//! without a node.

use alloy::primitives::{Address, B256, U256};
use futures_util::stream::BoxStream;

use crate::contracts::{ConstructorArgs, RaffleState};
use crate::error::{ChainError, DeployError};

/// Where a contract creation landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
}

/// Outcome of reading a `createSubscription` receipt.
///
/// A receipt whose logs do not include a decodable `SubscriptionCreated`
/// from the coordinator is `Undecoded`; callers must not guess an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionReceipt {
    Decoded { subscription_id: u64 },
    Undecoded,
}

/// VRF v2 coordinator (the mock on development networks).
pub trait VrfCoordinator {
    fn address(&self) -> Address;

    async fn create_subscription(&self) -> Result<SubscriptionReceipt, ChainError>;

    async fn fund_subscription(&self, subscription_id: u64, amount: U256) -> Result<(), ChainError>;

    async fn add_consumer(&self, subscription_id: u64, consumer: Address) -> Result<(), ChainError>;

    async fn consumer_is_added(&self, subscription_id: u64, consumer: Address) -> Result<bool, ChainError>;

    /// Fails with [`ChainError::NonexistentRequest`] for ids the coordinator never issued.
    async fn fulfill_random_words(&self, request_id: U256, consumer: Address) -> Result<(), ChainError>;
}

/// A deployed raffle.
pub trait RaffleContract {
    fn address(&self) -> Address;

    async fn entrance_fee(&self) -> Result<U256, ChainError>;
    async fn interval(&self) -> Result<U256, ChainError>;
    async fn raffle_state(&self) -> Result<RaffleState, ChainError>;
    async fn player(&self, index: u64) -> Result<Address, ChainError>;
    async fn number_of_players(&self) -> Result<U256, ChainError>;
    async fn recent_winner(&self) -> Result<Address, ChainError>;
    async fn last_timestamp(&self) -> Result<U256, ChainError>;
    async fn vrf_coordinator(&self) -> Result<Address, ChainError>;

    /// Enter from `from`, paying `value`. Returns the player named by the
    /// `RaffleEnter` event, if one was emitted.
    async fn enter(&self, from: Address, value: U256) -> Result<Option<Address>, ChainError>;

    async fn check_upkeep(&self) -> Result<bool, ChainError>;

    /// Perform upkeep from `from` and return the VRF request id it produced.
    async fn perform_upkeep(&self, from: Address) -> Result<U256, ChainError>;

    /// Subscribe to `WinnerPicked`. Only events emitted after this call
    /// returns are delivered.
    async fn winner_picked(&self) -> Result<BoxStream<'static, Address>, ChainError>;
}

/// A connected chain with funded accounts.
pub trait Chain {
    type Coordinator: VrfCoordinator;
    type Raffle: RaffleContract;

    /// Account that sends deployment and setup transactions.
    fn deployer(&self) -> Address;

    /// All signing accounts, deployer first.
    fn accounts(&self) -> &[Address];

    fn coordinator_at(&self, address: Address) -> Self::Coordinator;

    fn raffle_at(&self, address: Address) -> Self::Raffle;

    async fn deploy_coordinator_mock(
        &self,
        base_fee: U256,
        gas_price_link: U256,
        confirmations: u64,
    ) -> Result<DeployedContract, DeployError>;

    async fn deploy_raffle(
        &self,
        args: &ConstructorArgs,
        confirmations: u64,
    ) -> Result<DeployedContract, DeployError>;

    /// Move the clock of the next block forward (`evm_increaseTime`).
    async fn increase_time(&self, seconds: u64) -> Result<(), ChainError>;

    /// Mine an empty block (`evm_mine`).
    async fn mine(&self) -> Result<(), ChainError>;

    async fn balance_of(&self, address: Address) -> Result<U256, ChainError>;
}
