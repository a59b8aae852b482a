use crate::{
    error::decode_revert_error,
    gen::{
        entry_point_api::{
            DepositInfo, EntryPointAPIErrors, SenderAddressResult, UserOperation,
            ValidationResult, ValidationResultWithAggregation,
        },
        EntryPointAPI, EntryPointAPIEvents,
    },
    EntryPointError,
};
use ethers::{
    prelude::{ContractError, Event},
    providers::Middleware,
    types::{Address, Bytes, U256},
};
use std::sync::Arc;

/// Outcome of a successful `simulateValidation` call, decoded from the typed revert
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulateValidationResult {
    ValidationResult(ValidationResult),
    ValidationResultWithAggregation(ValidationResultWithAggregation),
}

/// Wrapper around the EntryPoint contract bindings; the single gateway for
/// all interaction with the on-chain contract
pub struct EntryPoint<M: Middleware + 'static> {
    eth_client: Arc<M>,
    address: Address,
    entry_point_api: EntryPointAPI<M>,
}

impl<M: Middleware + 'static> Clone for EntryPoint<M> {
    fn clone(&self) -> Self {
        Self {
            eth_client: self.eth_client.clone(),
            address: self.address,
            entry_point_api: self.entry_point_api.clone(),
        }
    }
}

impl<M: Middleware + 'static> EntryPoint<M> {
    pub fn new(eth_client: Arc<M>, address: Address) -> Self {
        let entry_point_api = EntryPointAPI::new(address, eth_client.clone());
        Self { eth_client, address, entry_point_api }
    }

    pub fn entry_point_api(&self) -> &EntryPointAPI<M> {
        &self.entry_point_api
    }

    pub fn events(&self) -> Event<Arc<M>, M, EntryPointAPIEvents> {
        self.entry_point_api.events()
    }

    pub fn eth_client(&self) -> Arc<M> {
        self.eth_client.clone()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn deserialize_error_msg(
        err: ContractError<M>,
    ) -> Result<EntryPointAPIErrors, EntryPointError> {
        match err {
            ContractError::DecodingError(e) => {
                Err(EntryPointError::Decode { inner: e.to_string() })
            }
            ContractError::AbiError(e) => Err(EntryPointError::ABI { inner: e.to_string() }),
            ContractError::MiddlewareError { e } => EntryPointError::from_middleware_error::<M>(e),
            ContractError::ProviderError { e } => EntryPointError::from_provider_error(&e),
            ContractError::Revert(data) => decode_revert_error(data),
            _ => Err(EntryPointError::Other { inner: err.to_string() }),
        }
    }

    /// Calls `simulateValidation` via `eth_call`; the entry point communicates the result
    /// by reverting, so a non-reverting call is itself an error
    pub async fn simulate_validation<U: Into<UserOperation>>(
        &self,
        uo: U,
    ) -> Result<SimulateValidationResult, EntryPointError> {
        let res = self.entry_point_api.simulate_validation(uo.into()).call().await;

        match res {
            Ok(_) => Err(EntryPointError::NoRevert { function: "simulate_validation".into() }),
            Err(e) => Self::deserialize_error_msg(e).and_then(|op| match op {
                EntryPointAPIErrors::FailedOp(err) => Err(EntryPointError::FailedOp(err)),
                EntryPointAPIErrors::ValidationResult(res) => {
                    Ok(SimulateValidationResult::ValidationResult(res))
                }
                EntryPointAPIErrors::ValidationResultWithAggregation(res) => {
                    Ok(SimulateValidationResult::ValidationResultWithAggregation(res))
                }
                EntryPointAPIErrors::RevertString(msg) => {
                    Err(EntryPointError::ExecutionReverted(msg))
                }
                _ => Err(EntryPointError::Other {
                    inner: format!("simulate validation error: {op:?}"),
                }),
            }),
        }
    }

    /// Calls `handleOps` via `eth_call` (no state mutation); used to obtain the typed
    /// `FailedOp` revert when diagnosing a failing bundle
    pub async fn handle_ops<U: Into<UserOperation>>(
        &self,
        uos: Vec<U>,
        beneficiary: Address,
    ) -> Result<(), EntryPointError> {
        self.entry_point_api
            .handle_ops(uos.into_iter().map(|u| u.into()).collect(), beneficiary)
            .call()
            .await
            .or_else(|e| {
                Self::deserialize_error_msg(e).and_then(|op| match op {
                    EntryPointAPIErrors::FailedOp(err) => Err(EntryPointError::FailedOp(err)),
                    EntryPointAPIErrors::RevertString(msg) => {
                        Err(EntryPointError::ExecutionReverted(msg))
                    }
                    _ => Err(EntryPointError::Other { inner: format!("handle ops error: {op:?}") }),
                })
            })
    }

    /// Deposit of an account (paymaster) held by the entry point
    pub async fn balance_of(&self, addr: &Address) -> Result<U256, EntryPointError> {
        let res = self.entry_point_api.balance_of(*addr).call().await;

        match res {
            Ok(balance) => Ok(balance),
            Err(err) => Err(EntryPointError::Other { inner: format!("balance of error: {err:?}") }),
        }
    }

    /// Deposit and stake information of an account
    pub async fn get_deposit_info(&self, addr: &Address) -> Result<DepositInfo, EntryPointError> {
        let res = self.entry_point_api.get_deposit_info(*addr).call().await;

        match res {
            Ok((deposit, staked, stake, unstake_delay_sec, withdraw_time)) => Ok(DepositInfo {
                deposit,
                staked,
                stake,
                unstake_delay_sec,
                withdraw_time,
            }),
            Err(err) => {
                Err(EntryPointError::Other { inner: format!("get deposit info error: {err:?}") })
            }
        }
    }

    /// Counterfactual sender address for the given init code (reverts with the result)
    pub async fn get_sender_address(
        &self,
        init_code: Bytes,
    ) -> Result<SenderAddressResult, EntryPointError> {
        let res = self.entry_point_api.get_sender_address(init_code).call().await;

        match res {
            Ok(_) => Err(EntryPointError::NoRevert { function: "get_sender_address".into() }),
            Err(e) => Self::deserialize_error_msg(e).and_then(|op| match op {
                EntryPointAPIErrors::SenderAddressResult(res) => Ok(res),
                EntryPointAPIErrors::FailedOp(err) => Err(EntryPointError::FailedOp(err)),
                _ => Err(EntryPointError::Other {
                    inner: format!("get sender address error: {op:?}"),
                }),
            }),
        }
    }
}
