use ethers::types::{H256, U256};
use thiserror::Error;

/// Errors of the bundling pipeline
#[derive(Debug, Error, Clone)]
pub enum BundlerError {
    /// No user operation passed bundle selection; suppressed to clients,
    /// surfaced only through the debug API
    #[error("not enough user operations to bundle")]
    NotEnoughUserOperations,

    /// The entry point reported a failing op index outside the bundle
    #[error("invalid opIndex returned: {op_index}")]
    InvalidOpIndex { op_index: U256 },

    /// `handleOps` reverted with a reason that maps to no known entity fault
    #[error("unknown handleOps revert: {reason}")]
    UnknownRevert { reason: String },

    /// The bundle transaction was mined but reverted
    #[error("bundle transaction failed; txHash: {tx_hash:?}")]
    BundleTxFailed { tx_hash: H256 },

    /// Provider/transport error
    #[error("provider error: {inner}")]
    Provider { inner: String },

    /// Any other error
    #[error("other error: {inner}")]
    Other { inner: String },
}
