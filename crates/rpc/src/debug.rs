use crate::{debug_api::DebugApiServer, error::JsonRpcError};
use async_trait::async_trait;
use ethers::{providers::Middleware, types::H256};
use jsonrpsee::core::RpcResult;
use operon_bundler::ExecutionManager;
use operon_mempool::UserOperationValidator;
use operon_primitives::{reputation::ReputationEntry, BundlingMode, UserOperation};
use std::sync::Arc;

/// Implementation of the `debug_bundler` namespace, backed by the execution manager
pub struct DebugApiServerImpl<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator + Clone + 'static,
{
    pub execution_manager: Arc<ExecutionManager<M, V>>,
}

#[async_trait]
impl<M, V> DebugApiServer for DebugApiServerImpl<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator + Clone + 'static,
{
    async fn clear_state(&self) -> RpcResult<()> {
        self.execution_manager.clear_state();
        Ok(())
    }

    async fn dump_mempool(&self) -> RpcResult<Vec<UserOperation>> {
        Ok(self.execution_manager.dump_mempool())
    }

    async fn send_bundle_now(&self) -> RpcResult<H256> {
        self.execution_manager
            .send_bundle_now()
            .await
            .map(|ret| ret.transaction_hash)
            .map_err(|err| JsonRpcError::from(err).0)
    }

    async fn set_bundling_mode(&self, mode: BundlingMode) -> RpcResult<()> {
        self.execution_manager.set_bundling_mode(mode);
        Ok(())
    }

    async fn set_bundling_interval(
        &self,
        interval: u64,
        max_mempool_size: u64,
    ) -> RpcResult<()> {
        self.execution_manager.set_bundling_interval(interval, max_mempool_size);
        Ok(())
    }

    async fn set_reputation(&self, entries: Vec<ReputationEntry>) -> RpcResult<()> {
        self.execution_manager.set_reputation(entries);
        Ok(())
    }

    async fn dump_reputation(&self) -> RpcResult<Vec<ReputationEntry>> {
        Ok(self.execution_manager.dump_reputation())
    }
}
