use crate::{error::JsonRpcError, eth_api::EthApiServer};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, U64},
    utils::to_checksum,
};
use jsonrpsee::core::RpcResult;
use operon_bundler::ExecutionManager;
use operon_mempool::UserOperationValidator;
use operon_primitives::{
    UserOperationGasEstimation, UserOperationHash, UserOperationReceipt, UserOperationRequest,
};
use std::{str::FromStr, sync::Arc};

/// Implementation of the ERC-4337 `eth` namespace, backed by the execution manager
pub struct EthApiServerImpl<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator + Clone + 'static,
{
    pub execution_manager: Arc<ExecutionManager<M, V>>,
}

#[async_trait]
impl<M, V> EthApiServer for EthApiServerImpl<M, V>
where
    M: Middleware + 'static,
    V: UserOperationValidator + Clone + 'static,
{
    async fn chain_id(&self) -> RpcResult<U64> {
        Ok(self.execution_manager.chain_id().into())
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<String>> {
        Ok(self
            .execution_manager
            .supported_entry_points()
            .into_iter()
            .map(|ep| to_checksum(&ep, None))
            .collect())
    }

    async fn send_user_operation(
        &self,
        user_operation: UserOperationRequest,
        entry_point: Address,
    ) -> RpcResult<UserOperationHash> {
        self.execution_manager
            .send_user_operation(user_operation, &entry_point)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }

    async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperationRequest,
        entry_point: Address,
    ) -> RpcResult<UserOperationGasEstimation> {
        self.execution_manager
            .estimate_user_operation_gas(&user_operation, &entry_point)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }

    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: String,
    ) -> RpcResult<Option<UserOperationReceipt>> {
        let uo_hash = UserOperationHash::from_str(&user_operation_hash).map_err(|_| {
            JsonRpcError(jsonrpsee::types::ErrorObject::owned(
                jsonrpsee::types::error::INVALID_PARAMS_CODE,
                "Missing/invalid userOpHash".to_string(),
                None::<bool>,
            ))
            .0
        })?;

        self.execution_manager
            .get_user_operation_receipt(&uo_hash)
            .await
            .map_err(|err| JsonRpcError::from(err).0)
    }
}
