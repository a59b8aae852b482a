use ethers::types::H256;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use operon_primitives::{reputation::ReputationEntry, BundlingMode, UserOperation};

/// The `debug_bundler` namespace RPC methods trait, used by the bundler test
/// suite and operators to steer bundling by hand
#[rpc(server, namespace = "debug_bundler")]
pub trait DebugApi {
    /// Drops the mempool and the reputation registry.
    #[method(name = "clearState")]
    async fn clear_state(&self) -> RpcResult<()>;

    /// Dumps the user operations currently in the mempool.
    #[method(name = "dumpMempool")]
    async fn dump_mempool(&self) -> RpcResult<Vec<UserOperation>>;

    /// Forces the bundler to build and send a bundle now.
    ///
    /// # Returns
    /// * `RpcResult<H256>` - The hash of the bundle transaction.
    #[method(name = "sendBundleNow")]
    async fn send_bundle_now(&self) -> RpcResult<H256>;

    /// Sets the bundling mode, `"manual"` or `"auto"`.
    #[method(name = "setBundlingMode")]
    async fn set_bundling_mode(&self, mode: BundlingMode) -> RpcResult<()>;

    /// Reconfigures the auto-bundle loop: period in seconds and the mempool size at
    /// which a non-forced attempt bundles.
    #[method(name = "setBundlingInterval")]
    async fn set_bundling_interval(
        &self,
        interval: u64,
        max_mempool_size: u64,
    ) -> RpcResult<()>;

    /// Overwrites the reputation of the given entities.
    #[method(name = "setReputation")]
    async fn set_reputation(&self, entries: Vec<ReputationEntry>) -> RpcResult<()>;

    /// Dumps the reputation registry.
    #[method(name = "dumpReputation")]
    async fn dump_reputation(&self) -> RpcResult<Vec<ReputationEntry>>;
}
