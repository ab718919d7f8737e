//! In-process chain double for unit tests.
//!
//! Stands in for a development node so bootstrap, deployment sequencing and
//! the harness control flow can be tested without one: one block per
//! transaction, `evm_increaseTime` offsets applied to the next block, no gas
//! and no LINK accounting.
//!
//! The raffle and coordinator behaviour here is a minimal stand-in, not a
//! reference. The scenarios are checked against the real contracts only by
//! `raffle-deploy test --network hardhat`.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{keccak256, Address, U256};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::chain::{Chain, DeployedContract, RaffleContract, SubscriptionReceipt, VrfCoordinator};
use crate::contracts::{ConstructorArgs, RaffleState};
use crate::error::{ChainError, DeployError};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const ACCOUNTS: u8 = 10;

#[derive(Default)]
struct Subscription {
    balance: U256,
    consumers: Vec<Address>,
}

struct CoordinatorState {
    subscriptions: HashMap<u64, Subscription>,
    next_subscription: u64,
    requests: HashMap<U256, u64>,
    next_request: U256,
}

struct RaffleSlot {
    args: ConstructorArgs,
    players: Vec<Address>,
    state: RaffleState,
    recent_winner: Address,
    last_timestamp: u64,
}

struct State {
    timestamp: u64,
    pending_offset: u64,
    block_number: u64,
    transactions: usize,
    balances: HashMap<Address, U256>,
    coordinators: HashMap<Address, CoordinatorState>,
    raffles: HashMap<Address, RaffleSlot>,
    drop_subscription_logs: bool,
    fail_add_consumer: bool,
}

impl State {
    /// Seal a block for one transaction and return its timestamp.
    fn seal(&mut self) -> u64 {
        self.timestamp += 1 + std::mem::take(&mut self.pending_offset);
        self.block_number += 1;
        self.timestamp
    }

    fn transact(&mut self) -> u64 {
        self.transactions += 1;
        self.seal()
    }

    fn balance(&self, address: &Address) -> U256 {
        self.balances.get(address).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), ChainError> {
        let available = self.balance(&from);
        if available < value {
            return Err(ChainError::Rpc(format!("insufficient funds for {from}")));
        }
        self.balances.insert(from, available - value);
        *self.balances.entry(to).or_default() += value;
        Ok(())
    }

    fn upkeep_needed(&self, raffle: &Address, timestamp: u64) -> Result<bool, ChainError> {
        let slot = self.raffle(raffle)?;
        let elapsed = timestamp.saturating_sub(slot.last_timestamp);
        Ok(slot.state == RaffleState::Open
            && elapsed > slot.args.interval
            && !slot.players.is_empty()
            && !self.balance(raffle).is_zero())
    }

    fn raffle(&self, address: &Address) -> Result<&RaffleSlot, ChainError> {
        self.raffles
            .get(address)
            .ok_or_else(|| ChainError::Rpc(format!("no contract at {address}")))
    }

    fn coordinator(&mut self, address: &Address) -> Result<&mut CoordinatorState, ChainError> {
        self.coordinators
            .get_mut(address)
            .ok_or_else(|| ChainError::Rpc(format!("no contract at {address}")))
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap()
}

/// First random word the coordinator mock produces for a request.
fn random_word(request_id: U256) -> U256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&request_id.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(preimage).0)
}

#[derive(Clone)]
pub struct SimChain {
    state: Arc<Mutex<State>>,
    accounts: Vec<Address>,
    winners: broadcast::Sender<(Address, Address)>,
}

impl SimChain {
    pub fn new() -> Self {
        let accounts: Vec<Address> = (1..=ACCOUNTS).map(Address::with_last_byte).collect();
        let funding = parse_ether("10000").unwrap();
        let balances = accounts.iter().map(|a| (*a, funding)).collect();
        let (winners, _) = broadcast::channel(16);

        Self {
            state: Arc::new(Mutex::new(State {
                timestamp: GENESIS_TIMESTAMP,
                pending_offset: 0,
                block_number: 0,
                transactions: 0,
                balances,
                coordinators: HashMap::new(),
                raffles: HashMap::new(),
                drop_subscription_logs: false,
                fail_add_consumer: false,
            })),
            accounts,
            winners,
        }
    }

    /// LINK balance of a subscription on a coordinator mock.
    pub fn subscription_balance(&self, coordinator: Address, subscription_id: u64) -> Option<U256> {
        lock(&self.state)
            .coordinators
            .get(&coordinator)?
            .subscriptions
            .get(&subscription_id)
            .map(|s| s.balance)
    }

    /// State-changing transactions accepted so far.
    pub fn transaction_count(&self) -> usize {
        lock(&self.state).transactions
    }

    /// Make subsequent `createSubscription` receipts carry no decodable log.
    pub fn drop_subscription_logs(&self) {
        lock(&self.state).drop_subscription_logs = true;
    }

    /// Make subsequent `addConsumer` calls revert.
    pub fn fail_add_consumer(&self) {
        lock(&self.state).fail_add_consumer = true;
    }

    pub fn raffle_constructor_args(&self, raffle: Address) -> Option<ConstructorArgs> {
        lock(&self.state).raffles.get(&raffle).map(|r| r.args.clone())
    }

    fn next_contract(&self, state: &mut State) -> DeployedContract {
        state.transact();
        let address = self.deployer().create(state.transactions as u64);
        DeployedContract {
            address,
            transaction_hash: keccak256(address),
            block_number: Some(state.block_number),
        }
    }
}

impl Chain for SimChain {
    type Coordinator = SimCoordinator;
    type Raffle = SimRaffle;

    fn deployer(&self) -> Address {
        self.accounts[0]
    }

    fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    fn coordinator_at(&self, address: Address) -> SimCoordinator {
        SimCoordinator {
            state: self.state.clone(),
            winners: self.winners.clone(),
            address,
        }
    }

    fn raffle_at(&self, address: Address) -> SimRaffle {
        SimRaffle {
            state: self.state.clone(),
            winners: self.winners.clone(),
            address,
        }
    }

    async fn deploy_coordinator_mock(
        &self,
        _base_fee: U256,
        _gas_price_link: U256,
        _confirmations: u64,
    ) -> Result<DeployedContract, DeployError> {
        let mut state = lock(&self.state);
        let deployed = self.next_contract(&mut state);
        state.coordinators.insert(
            deployed.address,
            CoordinatorState {
                subscriptions: HashMap::new(),
                next_subscription: 1,
                requests: HashMap::new(),
                next_request: U256::from(1),
            },
        );
        Ok(deployed)
    }

    async fn deploy_raffle(
        &self,
        args: &ConstructorArgs,
        _confirmations: u64,
    ) -> Result<DeployedContract, DeployError> {
        let mut state = lock(&self.state);
        let deployed = self.next_contract(&mut state);
        let timestamp = state.timestamp;
        state.raffles.insert(
            deployed.address,
            RaffleSlot {
                args: args.clone(),
                players: Vec::new(),
                state: RaffleState::Open,
                recent_winner: Address::ZERO,
                last_timestamp: timestamp,
            },
        );
        Ok(deployed)
    }

    async fn increase_time(&self, seconds: u64) -> Result<(), ChainError> {
        lock(&self.state).pending_offset += seconds;
        Ok(())
    }

    async fn mine(&self) -> Result<(), ChainError> {
        lock(&self.state).seal();
        Ok(())
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ChainError> {
        Ok(lock(&self.state).balance(&address))
    }
}

pub struct SimCoordinator {
    state: Arc<Mutex<State>>,
    winners: broadcast::Sender<(Address, Address)>,
    address: Address,
}

impl VrfCoordinator for SimCoordinator {
    fn address(&self) -> Address {
        self.address
    }

    async fn create_subscription(&self) -> Result<SubscriptionReceipt, ChainError> {
        let mut state = lock(&self.state);
        let drop_logs = state.drop_subscription_logs;
        let coordinator = state.coordinator(&self.address)?;
        let id = coordinator.next_subscription;
        coordinator.next_subscription += 1;
        coordinator.subscriptions.insert(id, Subscription::default());
        state.transact();

        Ok(if drop_logs {
            SubscriptionReceipt::Undecoded
        } else {
            SubscriptionReceipt::Decoded { subscription_id: id }
        })
    }

    async fn fund_subscription(&self, subscription_id: u64, amount: U256) -> Result<(), ChainError> {
        let mut state = lock(&self.state);
        let subscription = state
            .coordinator(&self.address)?
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| ChainError::Reverted("InvalidSubscription()".into()))?;
        subscription.balance += amount;
        state.transact();
        Ok(())
    }

    async fn add_consumer(&self, subscription_id: u64, consumer: Address) -> Result<(), ChainError> {
        let mut state = lock(&self.state);
        if state.fail_add_consumer {
            return Err(ChainError::Reverted("TooManyConsumers()".into()));
        }
        let subscription = state
            .coordinator(&self.address)?
            .subscriptions
            .get_mut(&subscription_id)
            .ok_or_else(|| ChainError::Reverted("InvalidSubscription()".into()))?;
        if !subscription.consumers.contains(&consumer) {
            subscription.consumers.push(consumer);
        }
        state.transact();
        Ok(())
    }

    async fn consumer_is_added(&self, subscription_id: u64, consumer: Address) -> Result<bool, ChainError> {
        let mut state = lock(&self.state);
        Ok(state
            .coordinator(&self.address)?
            .subscriptions
            .get(&subscription_id)
            .is_some_and(|s| s.consumers.contains(&consumer)))
    }

    async fn fulfill_random_words(&self, request_id: U256, consumer: Address) -> Result<(), ChainError> {
        let mut state = lock(&self.state);
        let coordinator = state.coordinator(&self.address)?;
        let subscription_id = *coordinator
            .requests
            .get(&request_id)
            .ok_or(ChainError::NonexistentRequest(request_id))?;
        if !coordinator.subscriptions.contains_key(&subscription_id) {
            return Err(ChainError::Reverted("InvalidSubscription()".into()));
        }
        coordinator.requests.remove(&request_id);
        let timestamp = state.transact();

        // A failing callback does not revert the fulfillment.
        let Some(slot) = state.raffles.get_mut(&consumer) else {
            return Ok(());
        };
        if slot.players.is_empty() {
            return Ok(());
        }
        let index = (random_word(request_id) % U256::from(slot.players.len())).to::<usize>();
        let winner = slot.players[index];
        slot.recent_winner = winner;
        slot.players.clear();
        slot.state = RaffleState::Open;
        slot.last_timestamp = timestamp;

        let pot = state.balance(&consumer);
        state.transfer(consumer, winner, pot)?;
        drop(state);

        let _ = self.winners.send((consumer, winner));
        Ok(())
    }
}

pub struct SimRaffle {
    state: Arc<Mutex<State>>,
    winners: broadcast::Sender<(Address, Address)>,
    address: Address,
}

impl SimRaffle {
    fn read<T>(&self, f: impl FnOnce(&RaffleSlot) -> T) -> Result<T, ChainError> {
        let state = lock(&self.state);
        state.raffle(&self.address).map(f)
    }
}

impl RaffleContract for SimRaffle {
    fn address(&self) -> Address {
        self.address
    }

    async fn entrance_fee(&self) -> Result<U256, ChainError> {
        self.read(|r| r.args.entrance_fee)
    }

    async fn interval(&self) -> Result<U256, ChainError> {
        self.read(|r| U256::from(r.args.interval))
    }

    async fn raffle_state(&self) -> Result<RaffleState, ChainError> {
        self.read(|r| r.state)
    }

    async fn player(&self, index: u64) -> Result<Address, ChainError> {
        self.read(|r| r.players.get(index as usize).copied())?
            .ok_or_else(|| ChainError::Reverted("array out-of-bounds access".into()))
    }

    async fn number_of_players(&self) -> Result<U256, ChainError> {
        self.read(|r| U256::from(r.players.len()))
    }

    async fn recent_winner(&self) -> Result<Address, ChainError> {
        self.read(|r| r.recent_winner)
    }

    async fn last_timestamp(&self) -> Result<U256, ChainError> {
        self.read(|r| U256::from(r.last_timestamp))
    }

    async fn vrf_coordinator(&self) -> Result<Address, ChainError> {
        self.read(|r| r.args.vrf_coordinator)
    }

    async fn enter(&self, from: Address, value: U256) -> Result<Option<Address>, ChainError> {
        let mut state = lock(&self.state);
        let slot = state.raffle(&self.address)?;
        if value < slot.args.entrance_fee {
            return Err(ChainError::Reverted("Raffle__NotEnoughETHEntered()".into()));
        }
        if slot.state != RaffleState::Open {
            return Err(ChainError::Reverted("Raffle__RaffleNotOpen()".into()));
        }
        state.transfer(from, self.address, value)?;
        if let Some(slot) = state.raffles.get_mut(&self.address) {
            slot.players.push(from);
        }
        state.transact();
        Ok(Some(from))
    }

    async fn check_upkeep(&self) -> Result<bool, ChainError> {
        let state = lock(&self.state);
        state.upkeep_needed(&self.address, state.timestamp)
    }

    async fn perform_upkeep(&self, _from: Address) -> Result<U256, ChainError> {
        let mut state = lock(&self.state);
        let next_block = state.timestamp + 1 + state.pending_offset;
        if !state.upkeep_needed(&self.address, next_block)? {
            return Err(ChainError::Reverted("Raffle__UpkeepNotNeeded".into()));
        }

        let (coordinator, subscription_id) = {
            let slot = state.raffle(&self.address)?;
            (slot.args.vrf_coordinator, slot.args.subscription_id)
        };
        let raffle = self.address;
        let coordinator = state.coordinator(&coordinator)?;
        let registered = coordinator
            .subscriptions
            .get(&subscription_id)
            .is_some_and(|s| s.consumers.contains(&raffle));
        if !registered {
            return Err(ChainError::Reverted("InvalidConsumer()".into()));
        }
        let request_id = coordinator.next_request;
        coordinator.next_request += U256::from(1);
        coordinator.requests.insert(request_id, subscription_id);

        if let Some(slot) = state.raffles.get_mut(&raffle) {
            slot.state = RaffleState::Calculating;
        }
        state.transact();
        Ok(request_id)
    }

    async fn winner_picked(&self) -> Result<BoxStream<'static, Address>, ChainError> {
        let raffle = self.address;
        let rx = self.winners.subscribe();
        Ok(futures_util::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok((from, winner)) if from == raffle => return Some((winner, rx)),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }
}
