//! Bundle assembly, event ingestion and the execution surface of the ERC-4337 bundler

mod bundler;
mod error;
mod events;
mod execution;

pub use bundler::{BundleManager, SendBundleReturn};
pub use error::BundlerError;
pub use events::EventsManager;
pub use execution::ExecutionManager;
