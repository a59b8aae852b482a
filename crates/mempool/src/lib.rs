//! User operation mempool, reputation and validation for the ERC-4337 bundler

mod error;
mod mempool;
mod reputation;
mod utils;
mod validate;

pub use error::{AdmissionError, MempoolError, ReputationError, ValidationError};
pub use mempool::{Mempool, MempoolEntry};
pub use reputation::Reputation;
pub use utils::{calculate_valid_gas, div_ceil, Overhead};
pub use validate::{
    AggregatorInfo, ReturnInfo, UserOperationValidator, ValidationManager, ValidationOutcome,
};
