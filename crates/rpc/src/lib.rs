//! JSON-RPC interface of the ERC-4337 bundler

mod debug;
mod debug_api;
mod error;
mod eth;
mod eth_api;
mod rpc;

pub use debug::DebugApiServerImpl;
pub use debug_api::DebugApiServer;
pub use error::JsonRpcError;
pub use eth::EthApiServerImpl;
pub use eth_api::EthApiServer;
pub use rpc::JsonRpcServer;
