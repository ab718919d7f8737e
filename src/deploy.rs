//! Deployment steps and their sequencing.
//!
//! Two steps exist, each carrying tags for selective runs:
//!
//! - **mocks** (`all`, `mocks`): development networks only; deploys the VRF
//!   coordinator mock.
//! - **raffle** (`all`, `raffle`): resolve parameters, bootstrap the
//!   subscription, deploy, verify (public networks), register the consumer
//!   (development networks).
//!
//! Every step except verification is fatal. A record is stored only after
//! the last fatal action of its step succeeded.

use alloy::primitives::U256;
use tracing::{info, warn};

use crate::bootstrap::{Bootstrapper, SubscriptionHandle};
use crate::chain::{Chain, DeployedContract, VrfCoordinator};
use crate::contracts::{ConstructorArgs, RAFFLE, VRF_COORDINATOR_MOCK};
use crate::deployments::{DeploymentRecord, Deployments};
use crate::error::DeployError;
use crate::networks::{NetworkTable, VERIFICATION_BLOCK_CONFIRMATIONS};
use crate::verify::SourceVerifier;

/// Premium charged per request by the mock coordinator: 0.25 LINK.
pub const MOCK_BASE_FEE: U256 = U256::from_limbs([250_000_000_000_000_000, 0, 0, 0]);

/// LINK per gas used by the mock coordinator.
pub const MOCK_GAS_PRICE_LINK: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

/// Selects deployment steps by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeployTag {
    All,
    Mocks,
    Raffle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Mocks,
    Raffle,
}

impl Step {
    /// Steps in execution order.
    const ALL: [Step; 2] = [Step::Mocks, Step::Raffle];

    fn tags(self) -> &'static [DeployTag] {
        match self {
            Step::Mocks => &[DeployTag::All, DeployTag::Mocks],
            Step::Raffle => &[DeployTag::All, DeployTag::Raffle],
        }
    }

    fn selected_by(self, tags: &[DeployTag]) -> bool {
        self.tags().iter().any(|t| tags.contains(t))
    }
}

/// Returns true if `tags` selects the raffle step.
pub fn selects_raffle(tags: &[DeployTag]) -> bool {
    Step::Raffle.selected_by(tags)
}

/// Confirmations to wait for: one locally, more on public networks.
pub fn confirmations_for(is_simulated: bool) -> u64 {
    if is_simulated {
        1
    } else {
        VERIFICATION_BLOCK_CONFIRMATIONS
    }
}

/// Result of the raffle step.
#[derive(Debug, Clone)]
pub struct RaffleDeployment {
    pub record: DeploymentRecord,
    pub args: ConstructorArgs,
    pub subscription: Option<SubscriptionHandle>,
}

/// What a tagged run deployed.
#[derive(Debug, Default)]
pub struct DeploySummary {
    pub mock: Option<DeploymentRecord>,
    pub raffle: Option<RaffleDeployment>,
}

pub struct Orchestrator<'a, C: Chain, V: SourceVerifier> {
    chain: &'a C,
    table: &'a NetworkTable,
    verifier: Option<&'a V>,
}

impl<'a, C: Chain, V: SourceVerifier> Orchestrator<'a, C, V> {
    /// `verifier` is consulted only on public networks.
    pub fn new(chain: &'a C, table: &'a NetworkTable, verifier: Option<&'a V>) -> Self {
        Self {
            chain,
            table,
            verifier,
        }
    }

    /// Run every step selected by `tags`, mocks first.
    pub async fn run_tags(
        &self,
        chain_id: u64,
        is_simulated: bool,
        tags: &[DeployTag],
        deployments: &mut Deployments,
    ) -> Result<DeploySummary, DeployError> {
        if Step::Raffle.selected_by(tags) {
            self.table.validate_deployable(chain_id, is_simulated)?;
        }

        let mut summary = DeploySummary::default();
        for step in Step::ALL {
            if !step.selected_by(tags) {
                continue;
            }
            match step {
                Step::Mocks => summary.mock = self.deploy_mocks(is_simulated, deployments).await?,
                Step::Raffle => {
                    summary.raffle = Some(self.deploy_raffle(chain_id, is_simulated, deployments).await?)
                }
            }
        }
        Ok(summary)
    }

    /// Deploy the coordinator mock on development networks; no-op elsewhere.
    pub async fn deploy_mocks(
        &self,
        is_simulated: bool,
        deployments: &mut Deployments,
    ) -> Result<Option<DeploymentRecord>, DeployError> {
        if !is_simulated {
            info!(network = deployments.network(), "Not a development network, skipping mocks");
            return Ok(None);
        }

        info!(network = deployments.network(), "Development network detected, deploying mocks");
        let confirmations = confirmations_for(is_simulated);
        let deployed = self
            .chain
            .deploy_coordinator_mock(MOCK_BASE_FEE, MOCK_GAS_PRICE_LINK, confirmations)
            .await?;

        let record = record_for(
            &deployed,
            vec![MOCK_BASE_FEE.to_string(), MOCK_GAS_PRICE_LINK.to_string()],
            confirmations,
        );
        info!(address = %record.contract_address, "Deployed {VRF_COORDINATOR_MOCK}");
        deployments.save(VRF_COORDINATOR_MOCK, record.clone())?;
        Ok(Some(record))
    }

    /// Deploy the raffle on `chain_id`.
    pub async fn deploy_raffle(
        &self,
        chain_id: u64,
        is_simulated: bool,
        deployments: &mut Deployments,
    ) -> Result<RaffleDeployment, DeployError> {
        // 1. Parameters, validated before any transaction.
        let network = self.table.resolve(chain_id)?;
        let params = network.deployment_params()?;
        if !is_simulated {
            network.live_subscription()?;
        }

        // 2. Subscription.
        let bootstrap = Bootstrapper::new(self.chain, self.table)
            .bootstrap(chain_id, is_simulated, deployments)
            .await?;

        // 3. Constructor arguments.
        let args = ConstructorArgs::new(&params, bootstrap.coordinator, bootstrap.subscription_id);

        // 4. Deploy and wait.
        let confirmations = confirmations_for(is_simulated);
        info!(
            network = %network.name,
            deployer = %self.chain.deployer(),
            confirmations,
            args = ?args.to_strings(),
            "Deploying {RAFFLE}"
        );
        let deployed = self.chain.deploy_raffle(&args, confirmations).await?;
        info!(
            address = %deployed.address,
            tx = %deployed.transaction_hash,
            explorer = network.explorer_address_url(&deployed.address).as_deref(),
            "Deployed {RAFFLE}"
        );

        // 5. Source verification, best effort.
        if !is_simulated {
            if let Some(verifier) = self.verifier {
                info!("Verifying...");
                if let Err(e) = verifier.verify(deployed.address, &args).await {
                    warn!(address = %deployed.address, error = %e, "Verification failed, deployment stands");
                }
            }
        }

        // 6. The raffle can only request randomness once it is a consumer.
        if is_simulated {
            self.chain
                .coordinator_at(bootstrap.coordinator)
                .add_consumer(bootstrap.subscription_id, deployed.address)
                .await?;
            info!(
                subscription_id = bootstrap.subscription_id,
                consumer = %deployed.address,
                "Registered raffle as VRF consumer"
            );
        }

        let record = record_for(&deployed, args.to_strings(), confirmations);
        deployments.save(RAFFLE, record.clone())?;

        Ok(RaffleDeployment {
            record,
            args,
            subscription: bootstrap.created,
        })
    }
}

fn record_for(deployed: &DeployedContract, constructor_args: Vec<String>, confirmations: u64) -> DeploymentRecord {
    DeploymentRecord {
        contract_address: deployed.address,
        constructor_args,
        confirmations_waited: confirmations,
        transaction_hash: deployed.transaction_hash,
        block_number: deployed.block_number,
    }
}
