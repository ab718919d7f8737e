//! JSON-RPC implementation of the chain seams, backed by alloy.
//!
//! `hardhat` spawns a throwaway anvil node that lives as long as the
//! [`EvmChain`]. `localhost` connects to a running development node using its
//! well-known pre-funded accounts. `sepolia` signs with `PRIVATE_KEY`.

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::node_bindings::{Anvil, AnvilInstance};
use alloy::primitives::aliases::U96;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Log, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result, anyhow};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info};

use crate::artifacts::ArtifactStore;
use crate::chain::{Chain, DeployedContract, RaffleContract, SubscriptionReceipt, VrfCoordinator};
use crate::config::AppConfig;
use crate::contracts::Raffle::RaffleInstance;
use crate::contracts::VRFCoordinatorV2Mock::VRFCoordinatorV2MockInstance;
use crate::contracts::{
    ConstructorArgs, Raffle, RaffleState, VRFCoordinatorV2Mock, RAFFLE, VRF_COORDINATOR_MOCK,
};
use crate::error::{ChainError, DeployError};
use crate::networks::NetworkName;

/// Pre-funded accounts of a default development node (`test test ... junk`).
const DEV_PRIVATE_KEYS: &[&str] = &[
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    "0x7c852118294e51e653712a81e05800f419141751be58f605c371e15141b007a6",
    "0x47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a",
];

/// Classify a provider or contract error by its rendered message.
///
/// Node implementations disagree on error shapes, but all of them mention
/// the revert reason in the message.
fn classify(error: impl Display) -> ChainError {
    let message = scrub_urls(&format!("{error:#}"));
    let lower = message.to_ascii_lowercase();
    if lower.contains("revert") || lower.contains("execution reverted") {
        ChainError::Reverted(message)
    } else {
        ChainError::Rpc(message)
    }
}

/// Replace every URL in `message` with a placeholder. RPC endpoints usually
/// embed a provider key, and transport errors quote the endpoint verbatim.
fn scrub_urls(message: &str) -> String {
    const SCHEMES: [&str; 4] = ["https://", "http://", "wss://", "ws://"];

    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = SCHEMES.iter().filter_map(|scheme| rest.find(scheme)).min() {
        out.push_str(&rest[..start]);
        out.push_str("<redacted url>");
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| c.is_whitespace() || matches!(c, ')' | '"' | '\'' | ','))
            .unwrap_or(tail.len());
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

/// Read the subscription id from a `createSubscription` receipt's logs.
///
/// Only a `SubscriptionCreated` emitted by `coordinator` counts, wherever it
/// sits in the receipt.
fn subscription_from_logs(logs: &[Log], coordinator: Address) -> SubscriptionReceipt {
    logs.iter()
        .filter(|log| log.address() == coordinator)
        .find_map(|log| log.log_decode::<VRFCoordinatorV2Mock::SubscriptionCreated>().ok())
        .map_or(SubscriptionReceipt::Undecoded, |log| SubscriptionReceipt::Decoded {
            subscription_id: log.inner.data.subId,
        })
}

/// Request id of a `performUpkeep` receipt: the coordinator's
/// `RandomWordsRequested`, else the raffle's own `RequestedRaffleWinner`.
fn request_id_from_logs(logs: &[Log]) -> Option<U256> {
    logs.iter()
        .find_map(|log| {
            log.log_decode::<VRFCoordinatorV2Mock::RandomWordsRequested>()
                .ok()
                .map(|l| l.inner.data.requestId)
        })
        .or_else(|| {
            logs.iter().find_map(|log| {
                log.log_decode::<Raffle::RequestedRaffleWinner>()
                    .ok()
                    .map(|l| l.inner.data.requestId)
            })
        })
}

fn ensure_success(receipt: &TransactionReceipt) -> Result<(), ChainError> {
    if receipt.status() {
        Ok(())
    } else {
        Err(ChainError::Reverted(format!(
            "transaction {} reverted",
            receipt.transaction_hash
        )))
    }
}

/// A connected EVM chain.
pub struct EvmChain {
    provider: DynProvider,
    accounts: Vec<Address>,
    artifacts: ArtifactStore,
    _node: Option<AnvilInstance>,
}

impl EvmChain {
    pub async fn connect(config: &AppConfig, network: NetworkName) -> Result<Self> {
        let (url, signers, node) = match network {
            NetworkName::Hardhat => {
                let node = Anvil::new()
                    .chain_id(network.chain_id())
                    .try_spawn()
                    .context("failed to spawn anvil; is it installed and on PATH?")?;
                let signers = node
                    .keys()
                    .iter()
                    .map(|key| PrivateKeySigner::from_slice(&key.to_bytes()))
                    .collect::<Result<Vec<_>, _>>()
                    .context("anvil returned an invalid key")?;
                (node.endpoint(), signers, Some(node))
            }
            NetworkName::Localhost => {
                let signers = DEV_PRIVATE_KEYS
                    .iter()
                    .map(|key| PrivateKeySigner::from_str(key))
                    .collect::<Result<Vec<_>, _>>()
                    .context("invalid development key")?;
                (config.localhost_rpc_url.clone(), signers, None)
            }
            NetworkName::Sepolia => {
                let url = config
                    .sepolia_rpc_url
                    .as_ref()
                    .context("SEPOLIA_RPC_URL must be set for sepolia")?;
                let key = config
                    .private_key
                    .as_ref()
                    .context("PRIVATE_KEY must be set for sepolia")?;
                let signer = PrivateKeySigner::from_str(key.expose()).context("invalid PRIVATE_KEY")?;
                (url.expose().to_string(), vec![signer], None)
            }
        };

        let accounts: Vec<Address> = signers.iter().map(|s| s.address()).collect();
        let mut signers = signers.into_iter();
        let first = signers.next().context("no signing account available")?;
        let mut wallet = EthereumWallet::from(first);
        for signer in signers {
            wallet.register_signer(signer);
        }

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect(&url)
            .await
            .map_err(|e| anyhow!("failed to connect to {network} node: {}", scrub_urls(&format!("{e:#}"))))?
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| anyhow!("failed to query chain id of {network}: {}", scrub_urls(&format!("{e:#}"))))?;
        anyhow::ensure!(
            chain_id == network.chain_id(),
            "{network} node reports chain id {chain_id}, expected {}",
            network.chain_id()
        );

        info!(
            network = %network,
            chain_id,
            deployer = %accounts[0],
            accounts = accounts.len(),
            "Connected"
        );

        Ok(Self {
            provider,
            accounts,
            artifacts: ArtifactStore::new(config.artifacts_dir.clone()),
            _node: node,
        })
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    async fn deploy_contract(
        &self,
        name: &str,
        encoded_args: Vec<u8>,
        confirmations: u64,
    ) -> Result<DeployedContract, DeployError> {
        let artifact = self.artifacts.load(name)?;
        let mut code = artifact.bytecode.to_vec();
        code.extend_from_slice(&encoded_args);

        let tx = TransactionRequest::default()
            .with_from(self.deployer())
            .with_deploy_code(Bytes::from(code));

        let pending = self.provider.send_transaction(tx).await.map_err(classify)?;
        debug!(contract = name, tx = %pending.tx_hash(), confirmations, "Deployment submitted");

        let receipt = pending
            .with_required_confirmations(confirmations)
            .get_receipt()
            .await
            .map_err(classify)?;
        ensure_success(&receipt)?;

        let address = receipt
            .contract_address
            .ok_or(ChainError::MissingReceiptField("contractAddress"))?;

        Ok(DeployedContract {
            address,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }
}

impl Chain for EvmChain {
    type Coordinator = EvmCoordinator;
    type Raffle = EvmRaffle;

    fn deployer(&self) -> Address {
        self.accounts[0]
    }

    fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    fn coordinator_at(&self, address: Address) -> EvmCoordinator {
        EvmCoordinator {
            contract: VRFCoordinatorV2Mock::new(address, self.provider.clone()),
            from: self.deployer(),
        }
    }

    fn raffle_at(&self, address: Address) -> EvmRaffle {
        EvmRaffle {
            contract: Raffle::new(address, self.provider.clone()),
        }
    }

    async fn deploy_coordinator_mock(
        &self,
        base_fee: U256,
        gas_price_link: U256,
        confirmations: u64,
    ) -> Result<DeployedContract, DeployError> {
        use alloy::sol_types::SolConstructor;

        let args = VRFCoordinatorV2Mock::constructorCall {
            _baseFee: to_u96(base_fee)?,
            _gasPriceLink: to_u96(gas_price_link)?,
        };
        self.deploy_contract(VRF_COORDINATOR_MOCK, args.abi_encode(), confirmations)
            .await
    }

    async fn deploy_raffle(
        &self,
        args: &ConstructorArgs,
        confirmations: u64,
    ) -> Result<DeployedContract, DeployError> {
        self.deploy_contract(RAFFLE, args.abi_encode(), confirmations)
            .await
    }

    async fn increase_time(&self, seconds: u64) -> Result<(), ChainError> {
        self.provider
            .raw_request::<_, serde_json::Value>("evm_increaseTime".into(), (seconds,))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn mine(&self) -> Result<(), ChainError> {
        self.provider
            .raw_request::<_, serde_json::Value>("evm_mine".into(), ())
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ChainError> {
        self.provider.get_balance(address).await.map_err(classify)
    }
}

fn to_u96(value: U256) -> Result<U96, ChainError> {
    U96::checked_from_uint(value).ok_or_else(|| ChainError::Rpc(format!("{value} does not fit in uint96")))
}

pub struct EvmCoordinator {
    contract: VRFCoordinatorV2MockInstance<DynProvider>,
    from: Address,
}

impl VrfCoordinator for EvmCoordinator {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn create_subscription(&self) -> Result<SubscriptionReceipt, ChainError> {
        let receipt = self
            .contract
            .createSubscription()
            .from(self.from)
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(classify)?;
        ensure_success(&receipt)?;

        Ok(subscription_from_logs(receipt.inner.logs(), self.address()))
    }

    async fn fund_subscription(&self, subscription_id: u64, amount: U256) -> Result<(), ChainError> {
        let receipt = self
            .contract
            .fundSubscription(subscription_id, to_u96(amount)?)
            .from(self.from)
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(classify)?;
        ensure_success(&receipt)
    }

    async fn add_consumer(&self, subscription_id: u64, consumer: Address) -> Result<(), ChainError> {
        let receipt = self
            .contract
            .addConsumer(subscription_id, consumer)
            .from(self.from)
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(classify)?;
        ensure_success(&receipt)
    }

    async fn consumer_is_added(&self, subscription_id: u64, consumer: Address) -> Result<bool, ChainError> {
        self.contract
            .consumerIsAdded(subscription_id, consumer)
            .call()
            .await
            .map_err(classify)
    }

    async fn fulfill_random_words(&self, request_id: U256, consumer: Address) -> Result<(), ChainError> {
        let sent = self
            .contract
            .fulfillRandomWords(request_id, consumer)
            .from(self.from)
            .send()
            .await;

        let pending = match sent {
            Ok(pending) => pending,
            Err(e) => {
                let message = format!("{e:#}");
                if message.contains("nonexistent request") {
                    return Err(ChainError::NonexistentRequest(request_id));
                }
                return Err(classify(message));
            }
        };

        let receipt = pending.get_receipt().await.map_err(classify)?;
        ensure_success(&receipt)
    }
}

pub struct EvmRaffle {
    contract: RaffleInstance<DynProvider>,
}

impl RaffleContract for EvmRaffle {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn entrance_fee(&self) -> Result<U256, ChainError> {
        self.contract.getEntranceFee().call().await.map_err(classify)
    }

    async fn interval(&self) -> Result<U256, ChainError> {
        self.contract.getInterval().call().await.map_err(classify)
    }

    async fn raffle_state(&self) -> Result<RaffleState, ChainError> {
        let raw = self.contract.getRaffleState().call().await.map_err(classify)?;
        RaffleState::try_from(raw).map_err(|v| ChainError::Rpc(format!("unknown raffle state {v}")))
    }

    async fn player(&self, index: u64) -> Result<Address, ChainError> {
        self.contract
            .getPlayer(U256::from(index))
            .call()
            .await
            .map_err(classify)
    }

    async fn number_of_players(&self) -> Result<U256, ChainError> {
        self.contract.getNumberOfPlayers().call().await.map_err(classify)
    }

    async fn recent_winner(&self) -> Result<Address, ChainError> {
        self.contract.getRecentWinner().call().await.map_err(classify)
    }

    async fn last_timestamp(&self) -> Result<U256, ChainError> {
        self.contract.getLastTimeStamp().call().await.map_err(classify)
    }

    async fn vrf_coordinator(&self) -> Result<Address, ChainError> {
        self.contract.getVrfCoordinator().call().await.map_err(classify)
    }

    async fn enter(&self, from: Address, value: U256) -> Result<Option<Address>, ChainError> {
        let receipt = self
            .contract
            .enterRaffle()
            .from(from)
            .value(value)
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(classify)?;
        ensure_success(&receipt)?;

        Ok(receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| log.log_decode::<Raffle::RaffleEnter>().ok())
            .map(|log| log.inner.data.player))
    }

    async fn check_upkeep(&self) -> Result<bool, ChainError> {
        let ret = self
            .contract
            .checkUpkeep(Bytes::new())
            .call()
            .await
            .map_err(classify)?;
        Ok(ret.upkeepNeeded)
    }

    async fn perform_upkeep(&self, from: Address) -> Result<U256, ChainError> {
        let receipt = self
            .contract
            .performUpkeep(Bytes::new())
            .from(from)
            .send()
            .await
            .map_err(classify)?
            .get_receipt()
            .await
            .map_err(classify)?;
        ensure_success(&receipt)?;

        request_id_from_logs(receipt.inner.logs())
            .ok_or(ChainError::MissingReceiptField("RandomWordsRequested log"))
    }

    async fn winner_picked(&self) -> Result<BoxStream<'static, Address>, ChainError> {
        let poller = self
            .contract
            .WinnerPicked_filter()
            .watch()
            .await
            .map_err(classify)?;
        Ok(poller
            .into_stream()
            .filter_map(|item| async move { item.ok().map(|(event, _)| event.player) })
            .boxed())
    }
}
