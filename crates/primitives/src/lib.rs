//! Common types for the Operon ERC-4337 bundler

pub mod bundler;
pub mod constants;
pub mod provider;
pub mod reputation;
mod user_operation;
pub mod utils;
mod wallet;

pub use bundler::BundlingMode;
pub use user_operation::{
    UserOperation, UserOperationGasEstimation, UserOperationHash, UserOperationReceipt,
    UserOperationRequest,
};
pub use utils::get_address;
pub use wallet::Wallet;
