//! VRF subscription bootstrap.
//!
//! On development networks a fresh subscription is created on the recorded
//! coordinator mock and funded. On public networks the coordinator and
//! subscription come straight from the network table.
//!
//! Bootstrapping a development network is not idempotent: every call creates
//! another subscription. Call it once per deployment run.

use alloy::primitives::{Address, U256};
use tracing::info;

use crate::chain::{Chain, SubscriptionReceipt, VrfCoordinator};
use crate::contracts::VRF_COORDINATOR_MOCK;
use crate::deployments::Deployments;
use crate::error::DeployError;
use crate::networks::NetworkTable;

/// LINK (in juels) credited to a freshly created mock subscription: 1000 LINK.
pub const FUND_AMOUNT: U256 = U256::from_limbs([0x35c9_adc5_dea0_0000, 0x36, 0, 0]);

/// A subscription created during this run. Lives as long as the node's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub subscription_id: u64,
    pub funded_amount: U256,
}

/// Coordinator and subscription a raffle should be wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bootstrap {
    pub coordinator: Address,
    pub subscription_id: u64,
    /// Present only when the subscription was created by this run.
    pub created: Option<SubscriptionHandle>,
}

pub struct Bootstrapper<'a, C: Chain> {
    chain: &'a C,
    table: &'a NetworkTable,
}

impl<'a, C: Chain> Bootstrapper<'a, C> {
    pub fn new(chain: &'a C, table: &'a NetworkTable) -> Self {
        Self { chain, table }
    }

    pub async fn bootstrap(
        &self,
        chain_id: u64,
        is_simulated: bool,
        deployments: &Deployments,
    ) -> Result<Bootstrap, DeployError> {
        let network = self.table.resolve(chain_id)?;

        if !is_simulated {
            let (coordinator, subscription_id) = network.live_subscription()?;
            info!(
                chain_id,
                coordinator = %coordinator,
                subscription_id,
                "Using configured VRF subscription"
            );
            return Ok(Bootstrap {
                coordinator,
                subscription_id,
                created: None,
            });
        }

        let record = deployments
            .get(VRF_COORDINATOR_MOCK)
            .ok_or_else(|| DeployError::MockCoordinatorUnavailable(deployments.network().to_string()))?;
        let coordinator = self.chain.coordinator_at(record.contract_address);

        let subscription_id = match coordinator.create_subscription().await? {
            SubscriptionReceipt::Decoded { subscription_id } => subscription_id,
            SubscriptionReceipt::Undecoded => {
                return Err(DeployError::SubscriptionCreationFailed {
                    coordinator: coordinator.address(),
                });
            }
        };

        coordinator
            .fund_subscription(subscription_id, FUND_AMOUNT)
            .await?;

        info!(
            coordinator = %coordinator.address(),
            subscription_id,
            funded = %FUND_AMOUNT,
            "Created and funded mock VRF subscription"
        );

        Ok(Bootstrap {
            coordinator: coordinator.address(),
            subscription_id,
            created: Some(SubscriptionHandle {
                subscription_id,
                funded_amount: FUND_AMOUNT,
            }),
        })
    }
}
