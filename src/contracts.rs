//! ABI bindings for the Raffle contract and the VRF v2 coordinator mock, plus
//! the typed constructor argument list.

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolConstructor;
use std::fmt;

use crate::networks::DeploymentParams;

/// Artifact name of the raffle contract.
pub const RAFFLE: &str = "Raffle";
/// Artifact name of the coordinator mock.
pub const VRF_COORDINATOR_MOCK: &str = "VRFCoordinatorV2Mock";

sol! {
    #[sol(rpc)]
    #[derive(Debug)]
    contract Raffle {
        event RaffleEnter(address indexed player);
        event RequestedRaffleWinner(uint256 indexed requestId);
        event WinnerPicked(address indexed player);

        error Raffle__NotEnoughETHEntered();
        error Raffle__RaffleNotOpen();
        error Raffle__TransferFailed();
        error Raffle__UpkeepNotNeeded(uint256 currentBalance, uint256 numPlayers, uint256 raffleState);

        constructor(
            uint256 entranceFee,
            address vrfCoordinatorV2,
            bytes32 gasLane,
            uint64 subscriptionId,
            uint32 callbackGasLimit,
            uint256 interval
        );

        function enterRaffle() external payable;
        function checkUpkeep(bytes calldata checkData) external view returns (bool upkeepNeeded, bytes memory performData);
        function performUpkeep(bytes calldata performData) external;

        function getEntranceFee() external view returns (uint256);
        function getPlayer(uint256 index) external view returns (address);
        function getRecentWinner() external view returns (address);
        function getRaffleState() external view returns (uint8);
        function getNumberOfPlayers() external view returns (uint256);
        function getLastTimeStamp() external view returns (uint256);
        function getInterval() external view returns (uint256);
        function getVrfCoordinator() external view returns (address);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    contract VRFCoordinatorV2Mock {
        event SubscriptionCreated(uint64 indexed subId, address owner);
        event SubscriptionFunded(uint64 indexed subId, uint256 oldBalance, uint256 newBalance);
        event ConsumerAdded(uint64 indexed subId, address consumer);
        event RandomWordsRequested(
            bytes32 indexed keyHash,
            uint256 requestId,
            uint256 preSeed,
            uint64 indexed subId,
            uint16 minimumRequestConfirmations,
            uint32 callbackGasLimit,
            uint32 numWords,
            address indexed sender
        );
        event RandomWordsFulfilled(uint256 indexed requestId, uint256 outputSeed, uint96 payment, bool success);

        constructor(uint96 _baseFee, uint96 _gasPriceLink);

        function createSubscription() external returns (uint64 _subId);
        function fundSubscription(uint64 _subId, uint96 _amount) public;
        function addConsumer(uint64 _subId, address _consumer) external;
        function consumerIsAdded(uint64 _subId, address _consumer) public view returns (bool);
        function fulfillRandomWords(uint256 _requestId, address _consumer) external;
    }
}

/// Round state as reported by `getRaffleState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaffleState {
    Open,
    Calculating,
}

impl TryFrom<u8> for RaffleState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::Calculating),
            other => Err(other),
        }
    }
}

/// One positional constructor value, as logged and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArg {
    Uint(U256),
    Address(Address),
    Bytes32(B256),
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(v) => write!(f, "{v}"),
            Self::Address(a) => write!(f, "{a}"),
            Self::Bytes32(b) => write!(f, "{b}"),
        }
    }
}

/// Raffle constructor arguments.
///
/// The on-chain signature is
/// `(entranceFee, vrfCoordinatorV2, gasLane, subscriptionId, callbackGasLimit, interval)`.
/// Several of these share a shape, so a transposition would deploy without
/// complaint; [`ConstructorArgs::ordered`] and [`ConstructorArgs::abi_encode`]
/// are the only places the order is spelled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorArgs {
    pub entrance_fee: U256,
    pub vrf_coordinator: Address,
    pub gas_lane: B256,
    pub subscription_id: u64,
    pub callback_gas_limit: u32,
    pub interval: u64,
}

impl ConstructorArgs {
    pub fn new(params: &DeploymentParams, vrf_coordinator: Address, subscription_id: u64) -> Self {
        Self {
            entrance_fee: params.entrance_fee,
            vrf_coordinator,
            gas_lane: params.gas_lane,
            subscription_id,
            callback_gas_limit: params.callback_gas_limit,
            interval: params.interval,
        }
    }

    /// Positional view in constructor order.
    pub fn ordered(&self) -> Vec<ConstructorArg> {
        vec![
            ConstructorArg::Uint(self.entrance_fee),
            ConstructorArg::Address(self.vrf_coordinator),
            ConstructorArg::Bytes32(self.gas_lane),
            ConstructorArg::Uint(U256::from(self.subscription_id)),
            ConstructorArg::Uint(U256::from(self.callback_gas_limit)),
            ConstructorArg::Uint(U256::from(self.interval)),
        ]
    }

    /// ABI-encoded constructor parameters, appended to the creation bytecode
    /// and submitted for source verification.
    pub fn abi_encode(&self) -> Vec<u8> {
        Raffle::constructorCall {
            entranceFee: self.entrance_fee,
            vrfCoordinatorV2: self.vrf_coordinator,
            gasLane: self.gas_lane,
            subscriptionId: self.subscription_id,
            callbackGasLimit: self.callback_gas_limit,
            interval: U256::from(self.interval),
        }
        .abi_encode()
    }

    /// Display form of [`ConstructorArgs::ordered`], stored with the deployment.
    pub fn to_strings(&self) -> Vec<String> {
        self.ordered().iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    fn sample() -> ConstructorArgs {
        ConstructorArgs {
            entrance_fee: U256::from(10_000_000_000_000_000u64),
            vrf_coordinator: address!("0x9ddfaca8183c41ad55329bdeed9f6a8d53168b1b"),
            gas_lane: b256!("0x787d74caea10b2b357790d5b5247c2f63d1d91572a9846f780606e4d953677ae"),
            subscription_id: 588,
            callback_gas_limit: 500_000,
            interval: 30,
        }
    }

    #[test]
    fn ordered_matches_constructor_signature() {
        let args = sample();
        assert_eq!(
            args.ordered(),
            vec![
                ConstructorArg::Uint(args.entrance_fee),
                ConstructorArg::Address(args.vrf_coordinator),
                ConstructorArg::Bytes32(args.gas_lane),
                ConstructorArg::Uint(U256::from(588u64)),
                ConstructorArg::Uint(U256::from(500_000u64)),
                ConstructorArg::Uint(U256::from(30u64)),
            ]
        );
    }

    #[test]
    fn encoding_places_each_value_in_its_slot() {
        let args = sample();
        let encoded = args.abi_encode();
        assert_eq!(encoded.len(), 6 * 32);

        let slot = |i: usize| &encoded[i * 32..(i + 1) * 32];
        assert_eq!(U256::from_be_slice(slot(0)), args.entrance_fee);
        assert_eq!(&slot(1)[12..], args.vrf_coordinator.as_slice());
        assert_eq!(slot(2), args.gas_lane.as_slice());
        assert_eq!(U256::from_be_slice(slot(3)), U256::from(588u64));
        assert_eq!(U256::from_be_slice(slot(4)), U256::from(500_000u64));
        assert_eq!(U256::from_be_slice(slot(5)), U256::from(30u64));
    }

    #[test]
    fn string_form_is_decimal_and_hex() {
        let strings = sample().to_strings();
        assert_eq!(strings[0], "10000000000000000");
        assert_eq!(strings[3], "588");
        assert!(strings[2].starts_with("0x787d74ca"));
        assert!(strings[1].eq_ignore_ascii_case("0x9ddfaca8183c41ad55329bdeed9f6a8d53168b1b"));
    }

    #[test]
    fn raffle_state_from_raw() {
        assert_eq!(RaffleState::try_from(0), Ok(RaffleState::Open));
        assert_eq!(RaffleState::try_from(1), Ok(RaffleState::Calculating));
        assert_eq!(RaffleState::try_from(7), Err(7));
    }
}
