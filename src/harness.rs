//! Behavioural scenarios for a deployed raffle on a development network.
//!
//! Every scenario gets a fresh fixture (coordinator mock plus raffle) so no
//! state leaks between them. Time-dependent checks move the node clock with
//! `evm_increaseTime` and `evm_mine`, and the winner event is awaited through
//! a subscription opened before fulfillment, bounded by a timeout.

use alloy::primitives::{Address, U256};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

use crate::chain::{Chain, RaffleContract, VrfCoordinator};
use crate::contracts::RaffleState;
use crate::deploy::{DeployTag, Orchestrator};
use crate::deployments::Deployments;
use crate::error::{ChainError, DeployError};
use crate::networks::{DeploymentParams, NetworkTable};
use crate::verify::EtherscanVerifier;

/// Entrants used by the full-round scenario, taken after the deployer.
const ROUND_ENTRANTS: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    #[error("no WinnerPicked event within {0:?}")]
    Timeout(Duration),

    #[error("WinnerPicked subscription closed before an event arrived")]
    SubscriptionClosed,

    #[error("assertion failed: {0}")]
    Assertion(String),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

macro_rules! check {
    ($cond:expr, $($msg:tt)+) => {
        if !$cond {
            return Err(HarnessError::Assertion(format!($($msg)+)));
        }
    };
}

/// Wait for the next winner on `stream`, failing after `timeout`.
pub async fn wait_for_winner(
    stream: &mut BoxStream<'static, Address>,
    timeout: Duration,
) -> Result<Address, HarnessError> {
    match tokio::time::timeout(timeout, stream.next()).await {
        Ok(Some(winner)) => Ok(winner),
        Ok(None) => Err(HarnessError::SubscriptionClosed),
        Err(_) => Err(HarnessError::Timeout(timeout)),
    }
}

/// Require that `result` is a contract revert.
fn expect_revert<T>(result: Result<T, ChainError>, action: &str) -> Result<(), HarnessError> {
    match result {
        Ok(_) => Err(HarnessError::Assertion(format!("{action} succeeded, expected a revert"))),
        Err(e) if e.is_revert() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A freshly deployed mock coordinator and raffle.
pub struct Fixture<'a, C: Chain> {
    chain: &'a C,
    pub raffle: C::Raffle,
    pub coordinator: C::Coordinator,
    pub subscription_id: u64,
    pub params: DeploymentParams,
}

impl<'a, C: Chain> Fixture<'a, C> {
    pub async fn deploy(chain: &'a C, table: &NetworkTable, chain_id: u64) -> Result<Self, HarnessError> {
        let mut deployments = Deployments::in_memory(table.resolve(chain_id)?.name.clone());
        let summary = Orchestrator::<C, EtherscanVerifier>::new(chain, table, None)
            .run_tags(chain_id, true, &[DeployTag::All], &mut deployments)
            .await?;

        let Some(raffle) = summary.raffle else {
            return Err(HarnessError::Assertion("raffle step did not run".into()));
        };

        Ok(Self {
            chain,
            raffle: chain.raffle_at(raffle.record.contract_address),
            coordinator: chain.coordinator_at(raffle.args.vrf_coordinator),
            subscription_id: raffle.args.subscription_id,
            params: table.deployment_params(chain_id)?,
        })
    }

    fn player(&self, index: usize) -> Result<Address, HarnessError> {
        self.chain.accounts().get(index).copied().ok_or_else(|| {
            HarnessError::Assertion(format!("need at least {} funded accounts", index + 1))
        })
    }

    async fn enter(&self, index: usize) -> Result<Address, HarnessError> {
        let player = self.player(index)?;
        self.raffle.enter(player, self.params.entrance_fee).await?;
        Ok(player)
    }

    /// Advance the clock by `seconds` and mine a block at the new time.
    async fn advance(&self, seconds: u64) -> Result<(), HarnessError> {
        self.chain.increase_time(seconds).await?;
        self.chain.mine().await?;
        Ok(())
    }

    async fn advance_past_interval(&self) -> Result<(), HarnessError> {
        self.advance(self.params.interval + 1).await
    }

    /// Enter once, expire the round and perform upkeep.
    async fn start_calculating(&self) -> Result<U256, HarnessError> {
        self.enter(1).await?;
        self.advance_past_interval().await?;
        Ok(self.raffle.perform_upkeep(self.chain.deployer()).await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    ConstructorInitializes,
    CoordinatorRoundTrip,
    EnterRejectsUnderpayment,
    EnterRecordsPlayer,
    EnterRejectedWhileCalculating,
    UpkeepFalseWithoutPlayers,
    UpkeepFalseWhenNotOpen,
    UpkeepFalseBeforeInterval,
    UpkeepTrueWhenReady,
    PerformUpkeepRevertsWhenNotNeeded,
    PerformUpkeepRequestsWinner,
    FulfillRejectsUnknownRequest,
    FullRoundPicksWinner,
}

impl Scenario {
    pub const ALL: [Scenario; 13] = [
        Scenario::ConstructorInitializes,
        Scenario::CoordinatorRoundTrip,
        Scenario::EnterRejectsUnderpayment,
        Scenario::EnterRecordsPlayer,
        Scenario::EnterRejectedWhileCalculating,
        Scenario::UpkeepFalseWithoutPlayers,
        Scenario::UpkeepFalseWhenNotOpen,
        Scenario::UpkeepFalseBeforeInterval,
        Scenario::UpkeepTrueWhenReady,
        Scenario::PerformUpkeepRevertsWhenNotNeeded,
        Scenario::PerformUpkeepRequestsWinner,
        Scenario::FulfillRejectsUnknownRequest,
        Scenario::FullRoundPicksWinner,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::ConstructorInitializes => "constructor initializes the raffle",
            Scenario::CoordinatorRoundTrip => "raffle is wired to the coordinator",
            Scenario::EnterRejectsUnderpayment => "enterRaffle rejects underpayment",
            Scenario::EnterRecordsPlayer => "enterRaffle records the player and emits RaffleEnter",
            Scenario::EnterRejectedWhileCalculating => "enterRaffle is rejected while calculating",
            Scenario::UpkeepFalseWithoutPlayers => "checkUpkeep is false without players",
            Scenario::UpkeepFalseWhenNotOpen => "checkUpkeep is false when not open",
            Scenario::UpkeepFalseBeforeInterval => "checkUpkeep is false before the interval",
            Scenario::UpkeepTrueWhenReady => "checkUpkeep is true when ready",
            Scenario::PerformUpkeepRevertsWhenNotNeeded => "performUpkeep reverts when not needed",
            Scenario::PerformUpkeepRequestsWinner => "performUpkeep requests a winner",
            Scenario::FulfillRejectsUnknownRequest => "fulfillRandomWords rejects unknown requests",
            Scenario::FullRoundPicksWinner => "a full round picks and pays a winner",
        }
    }

    pub async fn run<C: Chain>(
        self,
        chain: &C,
        table: &NetworkTable,
        chain_id: u64,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        let fx = Fixture::deploy(chain, table, chain_id).await?;
        let raffle = &fx.raffle;

        match self {
            Scenario::ConstructorInitializes => {
                let state = raffle.raffle_state().await?;
                check!(state == RaffleState::Open, "state is {state:?}");
                let interval = raffle.interval().await?;
                check!(
                    interval == U256::from(fx.params.interval),
                    "interval is {interval}, table says {}",
                    fx.params.interval
                );
                let fee = raffle.entrance_fee().await?;
                check!(fee == fx.params.entrance_fee, "entrance fee is {fee}");
            }

            Scenario::CoordinatorRoundTrip => {
                let coordinator = raffle.vrf_coordinator().await?;
                check!(
                    coordinator == fx.coordinator.address(),
                    "raffle points at {coordinator}, mock is {}",
                    fx.coordinator.address()
                );
                let added = fx
                    .coordinator
                    .consumer_is_added(fx.subscription_id, raffle.address())
                    .await?;
                check!(added, "raffle is not a consumer of subscription {}", fx.subscription_id);
            }

            Scenario::EnterRejectsUnderpayment => {
                let player = fx.player(1)?;
                expect_revert(raffle.enter(player, U256::ZERO).await, "entering without payment")?;
                let short = fx.params.entrance_fee.saturating_sub(U256::from(1));
                expect_revert(raffle.enter(player, short).await, "entering one wei short")?;
                let players = raffle.number_of_players().await?;
                check!(players.is_zero(), "{players} players after rejected entries");
            }

            Scenario::EnterRecordsPlayer => {
                let player = fx.player(1)?;
                let emitted = raffle.enter(player, fx.params.entrance_fee).await?;
                check!(emitted == Some(player), "RaffleEnter named {emitted:?}, expected {player}");
                let recorded = raffle.player(0).await?;
                check!(recorded == player, "player 0 is {recorded}, expected {player}");
            }

            Scenario::EnterRejectedWhileCalculating => {
                fx.start_calculating().await?;
                let player = fx.player(2)?;
                let fee = fx.params.entrance_fee;
                for value in [U256::ZERO, fee, fee * U256::from(2)] {
                    expect_revert(
                        raffle.enter(player, value).await,
                        &format!("entering with {value} wei while calculating"),
                    )?;
                }
            }

            Scenario::UpkeepFalseWithoutPlayers => {
                fx.advance_past_interval().await?;
                check!(!raffle.check_upkeep().await?, "upkeep needed without players");
            }

            Scenario::UpkeepFalseWhenNotOpen => {
                fx.start_calculating().await?;
                let state = raffle.raffle_state().await?;
                check!(state == RaffleState::Calculating, "state is {state:?}");
                check!(!raffle.check_upkeep().await?, "upkeep needed while calculating");
            }

            Scenario::UpkeepFalseBeforeInterval => {
                fx.enter(1).await?;
                fx.advance(fx.params.interval.saturating_sub(5)).await?;
                check!(!raffle.check_upkeep().await?, "upkeep needed before the interval");
            }

            Scenario::UpkeepTrueWhenReady => {
                fx.enter(1).await?;
                fx.advance_past_interval().await?;
                check!(raffle.check_upkeep().await?, "upkeep not needed after the interval");
            }

            Scenario::PerformUpkeepRevertsWhenNotNeeded => {
                expect_revert(
                    raffle.perform_upkeep(chain.deployer()).await,
                    "performUpkeep without players",
                )?;
            }

            Scenario::PerformUpkeepRequestsWinner => {
                let request_id = fx.start_calculating().await?;
                check!(request_id > U256::ZERO, "request id is {request_id}");
                let state = raffle.raffle_state().await?;
                check!(state == RaffleState::Calculating, "state is {state:?}");
            }

            Scenario::FulfillRejectsUnknownRequest => {
                fx.enter(1).await?;
                fx.advance_past_interval().await?;
                for id in [U256::ZERO, U256::from(1)] {
                    match fx.coordinator.fulfill_random_words(id, raffle.address()).await {
                        Err(ChainError::NonexistentRequest(_)) => {}
                        Ok(()) => return Err(HarnessError::Assertion(format!("request {id} was fulfilled"))),
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            Scenario::FullRoundPicksWinner => {
                let mut entrants = Vec::with_capacity(ROUND_ENTRANTS);
                for index in 1..=ROUND_ENTRANTS {
                    entrants.push(fx.enter(index).await?);
                }
                let started = raffle.last_timestamp().await?;
                fx.advance_past_interval().await?;

                let mut winners = raffle.winner_picked().await?;
                let request_id = raffle.perform_upkeep(chain.deployer()).await?;

                let mut before = Vec::with_capacity(entrants.len());
                for entrant in &entrants {
                    before.push(chain.balance_of(*entrant).await?);
                }

                fx.coordinator
                    .fulfill_random_words(request_id, raffle.address())
                    .await?;
                let winner = wait_for_winner(&mut winners, timeout).await?;
                info!(winner = %winner, request_id = %request_id, "Winner picked");

                let Some(position) = entrants.iter().position(|e| *e == winner) else {
                    return Err(HarnessError::Assertion(format!("{winner} never entered")));
                };
                let recent = raffle.recent_winner().await?;
                check!(recent == winner, "recent winner is {recent}, event named {winner}");

                let state = raffle.raffle_state().await?;
                check!(state == RaffleState::Open, "state is {state:?} after the round");
                let players = raffle.number_of_players().await?;
                check!(players.is_zero(), "{players} players after the round");
                let ended = raffle.last_timestamp().await?;
                check!(ended > started, "timestamp did not advance ({started} -> {ended})");

                let pot = fx.params.entrance_fee * U256::from(ROUND_ENTRANTS);
                let after = chain.balance_of(winner).await?;
                check!(
                    after == before[position] + pot,
                    "winner balance {after}, expected {} + {pot}",
                    before[position]
                );
            }
        }
        Ok(())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a scenario run.
#[derive(Debug, Default)]
pub struct HarnessReport {
    pub passed: usize,
    pub failed: Vec<(Scenario, HarnessError)>,
}

impl HarnessReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run every scenario in order, each against its own fixture.
pub async fn run_scenarios<C: Chain>(
    chain: &C,
    table: &NetworkTable,
    chain_id: u64,
    timeout: Duration,
) -> HarnessReport {
    let mut report = HarnessReport::default();
    for scenario in Scenario::ALL {
        match scenario.run(chain, table, chain_id, timeout).await {
            Ok(()) => {
                info!(scenario = %scenario, "ok");
                report.passed += 1;
            }
            Err(e) => {
                error!(scenario = %scenario, error = %e, "FAILED");
                report.failed.push((scenario, e));
            }
        }
    }
    report
}
