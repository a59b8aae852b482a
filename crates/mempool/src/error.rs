use ethers::types::{Address, U256};
use thiserror::Error;

/// Error related to reputation of the entities
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReputationError {
    /// Entity is banned
    #[error("{entity} {address:?} is banned")]
    BannedEntity { entity: String, address: Address },
    /// Stake of the entity is too low
    #[error("{entity} {address:?} stake {stake} is too low (min: {min_stake})")]
    StakeTooLow { entity: String, address: Address, stake: U256, min_stake: U256 },
    /// Unstake delay of the entity is too low
    #[error(
        "{entity} {address:?} unstake delay {unstake_delay} is too low (min: {min_unstake_delay})"
    )]
    UnstakeDelayTooLow {
        entity: String,
        address: Address,
        unstake_delay: U256,
        min_unstake_delay: U256,
    },
}

/// Error when validating a user operation failed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Structural/basic validation failure
    #[error("{message}")]
    InvalidFields { message: String },
    /// Entry point reverted during account validation
    #[error("{message}")]
    Simulation { message: String },
    /// Entry point reverted during paymaster validation
    #[error("paymaster validation failed: {message}")]
    PaymasterSimulation { paymaster: Address, message: String },
    /// User operation is not valid yet or expires too soon
    #[error("user operation is not valid yet or expires too soon (validAfter: {valid_after}, validUntil: {valid_until})")]
    ExpiresShortly { valid_after: u64, valid_until: u64 },
    /// Entity reputation/stake check failed
    #[error(transparent)]
    Reputation(#[from] ReputationError),
    /// User operation uses a signature aggregator
    #[error("currently not supporting aggregator {aggregator:?}")]
    UnsupportedAggregator { aggregator: Address },
    /// Signature verification failed
    #[error("invalid user operation signature or paymaster signature")]
    InvalidSignature,
    /// User operation reverted during call gas estimation
    #[error("{message}")]
    ExecutionReverted { message: String },
    /// Provider error
    #[error("provider error: {inner}")]
    Provider { inner: String },
    /// Any other error
    #[error("other error: {inner}")]
    Other { inner: String },
}

/// Error when a user operation cannot be admitted into the mempool
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    /// Replacement of a `(sender, nonce)` entry with insufficient fee bump
    #[error("replacement user operation must have higher {fee_field} (old: {old}, new: {new})")]
    ReplacementUnderpriced { fee_field: &'static str, old: U256, new: U256 },
    /// Sender exceeded the mempool quota without being staked
    #[error("sender {sender:?} already has too many user operations in mempool")]
    TooManyUserOperations { sender: Address },
}

/// Errors a user operation admission can surface to the client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mempool(#[from] MempoolError),
}
