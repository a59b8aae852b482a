use crate::{utils::Overhead, Reputation, ValidationError};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, Bytes, U256},
    utils::to_checksum,
};
use operon_contracts::{
    EntityFault, EntryPoint, EntryPointError, FailedOp, SimulateValidationResult,
};
use operon_primitives::{
    constants::validation::{
        entities::{AGGREGATOR, FACTORY, PAYMASTER},
        simulation::EXPIRATION_TIMESTAMP_DIFF,
    },
    reputation::StakeInfo,
    UserOperation, UserOperationRequest,
};
use std::time::{SystemTime, UNIX_EPOCH};

/// Gas and time-range information returned by the entry point for a validated
/// user operation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReturnInfo {
    pub pre_op_gas: U256,
    pub prefund: U256,
    pub sig_failed: bool,
    pub valid_after: u64,
    pub valid_until: u64,
    pub paymaster_context: Bytes,
}

/// Stake info of the aggregator a user operation delegates its signature to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatorInfo {
    pub address: Address,
    pub stake_info: StakeInfo,
}

/// Decoded outcome of a successful `simulateValidation`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub return_info: ReturnInfo,
    pub sender_info: StakeInfo,
    pub factory_info: Option<StakeInfo>,
    pub paymaster_info: Option<StakeInfo>,
    pub aggregator_info: Option<AggregatorInfo>,
}

/// Canonical pre-admission and pre-inclusion checks over a user operation
#[async_trait]
pub trait UserOperationValidator: Send + Sync {
    /// Pure field-level gate over the wire request
    fn validate_user_operation_basic(
        &self,
        request: &UserOperationRequest,
        entry_point: &Address,
        require_signature: bool,
        require_gas_params: bool,
    ) -> Result<(), ValidationError>;

    /// On-chain simulation via the entry point's `simulateValidation` plus error
    /// classification. `check_stakes` additionally verifies the factory's and
    /// paymaster's stake; it is set on admission and cleared on the pre-inclusion
    /// re-validation (stake cannot decrease between the two)
    async fn validate_user_operation(
        &self,
        uo: &UserOperation,
        check_stakes: bool,
    ) -> Result<ValidationOutcome, ValidationError>;
}

/// The canonical validator backed by the on-chain entry point
#[derive(Clone)]
pub struct ValidationManager<M: Middleware + 'static> {
    entry_point: EntryPoint<M>,
    reputation: Reputation,
}

impl<M: Middleware + 'static> ValidationManager<M> {
    pub fn new(entry_point: EntryPoint<M>, reputation: Reputation) -> Self {
        Self { entry_point, reputation }
    }

    /// Checks that happen after simulation decoded successfully: time window,
    /// signature, optional stake verification, aggregator rejection
    fn apply_simulation_checks(
        &self,
        outcome: ValidationOutcome,
        check_stakes: bool,
        now: u64,
    ) -> Result<ValidationOutcome, ValidationError> {
        check_return_info(&outcome.return_info, now)?;

        if outcome.return_info.sig_failed {
            return Err(ValidationError::InvalidSignature);
        }

        if check_stakes {
            if let Some(ref info) = outcome.factory_info {
                self.reputation.check_stake(FACTORY, Some(info))?;
            }
            if let Some(ref info) = outcome.paymaster_info {
                self.reputation.check_stake(PAYMASTER, Some(info))?;
            }
        }

        if let Some(ref aggregator) = outcome.aggregator_info {
            self.reputation.check_stake(AGGREGATOR, Some(&aggregator.stake_info))?;
            return Err(ValidationError::UnsupportedAggregator {
                aggregator: aggregator.address,
            });
        }

        Ok(outcome)
    }
}

#[async_trait]
impl<M: Middleware + 'static> UserOperationValidator for ValidationManager<M> {
    fn validate_user_operation_basic(
        &self,
        request: &UserOperationRequest,
        entry_point: &Address,
        require_signature: bool,
        require_gas_params: bool,
    ) -> Result<(), ValidationError> {
        if *entry_point != self.entry_point.address() {
            return Err(ValidationError::InvalidFields {
                message: format!(
                    "the entry point at {} is not supported; this bundler uses {}",
                    to_checksum(entry_point, None),
                    to_checksum(&self.entry_point.address(), None)
                ),
            });
        }

        if request.sender.is_none() {
            return Err(missing_field("sender"));
        }

        if request.nonce.is_none() {
            return Err(missing_field("nonce"));
        }

        if request.init_code.is_none() {
            return Err(missing_field("initCode"));
        }

        if request.call_data.is_none() {
            return Err(missing_field("callData"));
        }

        if request.paymaster_and_data.is_none() {
            return Err(missing_field("paymasterAndData"));
        }

        if require_signature && request.signature.is_none() {
            return Err(missing_field("signature"));
        }

        if require_gas_params {
            if request.pre_verification_gas.is_none() {
                return Err(missing_field("preVerificationGas"));
            }

            if request.verification_gas_limit.is_none() {
                return Err(missing_field("verificationGasLimit"));
            }

            if request.call_gas_limit.is_none() {
                return Err(missing_field("callGasLimit"));
            }

            if request.max_fee_per_gas.is_none() {
                return Err(missing_field("maxFeePerGas"));
            }

            if request.max_priority_fee_per_gas.is_none() {
                return Err(missing_field("maxPriorityFeePerGas"));
            }
        }

        if let Some(ref paymaster_and_data) = request.paymaster_and_data {
            if !paymaster_and_data.is_empty() && paymaster_and_data.len() < 20 {
                return Err(ValidationError::InvalidFields {
                    message: "paymasterAndData: must contain at least an address".into(),
                });
            }
        }

        if let Some(ref init_code) = request.init_code {
            if !init_code.is_empty() && init_code.len() < 20 {
                return Err(ValidationError::InvalidFields {
                    message: "initCode: must contain at least an address".into(),
                });
            }
        }

        if let Some(pre_verification_gas) = request.pre_verification_gas {
            let expected = Overhead::default()
                .calculate_pre_verification_gas(&UserOperation::from(request.clone()));
            if pre_verification_gas < expected {
                return Err(ValidationError::InvalidFields {
                    message: format!("preVerificationGas too low: expected at least {expected}"),
                });
            }
        }

        Ok(())
    }

    async fn validate_user_operation(
        &self,
        uo: &UserOperation,
        check_stakes: bool,
    ) -> Result<ValidationOutcome, ValidationError> {
        let outcome = match self.entry_point.simulate_validation(uo.clone()).await {
            Ok(res) => outcome_from_simulation(uo, res),
            Err(EntryPointError::FailedOp(op)) => return Err(classify_failed_op(uo, &op)),
            Err(EntryPointError::ExecutionReverted(message)) => {
                return Err(ValidationError::Simulation {
                    message: format!("account validation failed: {message}"),
                })
            }
            Err(EntryPointError::Provider { inner }) => {
                return Err(ValidationError::Provider { inner })
            }
            Err(err) => return Err(ValidationError::Other { inner: err.to_string() }),
        };

        self.apply_simulation_checks(outcome, check_stakes, unix_timestamp())
    }
}

fn missing_field(field: &str) -> ValidationError {
    ValidationError::InvalidFields { message: format!("missing {field} field") }
}

fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

fn stake_info(addr: Address, info: &(ethers::types::U256, ethers::types::U256)) -> StakeInfo {
    StakeInfo { address: addr, stake: info.0, unstake_delay: info.1 }
}

/// Maps the decoded `simulateValidation` revert into a [ValidationOutcome](ValidationOutcome),
/// attaching the entity addresses the entry point reports stake for
pub fn outcome_from_simulation(
    uo: &UserOperation,
    res: SimulateValidationResult,
) -> ValidationOutcome {
    let (return_info, sender_info, factory_info, paymaster_info, aggregator_info) = match res {
        SimulateValidationResult::ValidationResult(res) => {
            (res.return_info, res.sender_info, res.factory_info, res.paymaster_info, None)
        }
        SimulateValidationResult::ValidationResultWithAggregation(res) => (
            res.return_info,
            res.sender_info,
            res.factory_info,
            res.paymaster_info,
            Some(res.aggregator_info),
        ),
    };

    let (pre_op_gas, prefund, sig_failed, valid_after, valid_until, paymaster_context) =
        return_info;

    ValidationOutcome {
        return_info: ReturnInfo {
            pre_op_gas,
            prefund,
            sig_failed,
            valid_after,
            valid_until,
            paymaster_context,
        },
        sender_info: stake_info(uo.sender, &sender_info),
        factory_info: uo.factory().map(|addr| stake_info(addr, &factory_info)),
        paymaster_info: uo.paymaster().map(|addr| stake_info(addr, &paymaster_info)),
        aggregator_info: aggregator_info.map(|(aggregator, stake)| AggregatorInfo {
            address: aggregator,
            stake_info: stake_info(aggregator, &stake),
        }),
    }
}

/// Rejects user operations that are not valid yet or expire too soon to make it
/// into a bundle
pub fn check_return_info(return_info: &ReturnInfo, now: u64) -> Result<(), ValidationError> {
    if return_info.valid_after > now ||
        return_info.valid_until < now + EXPIRATION_TIMESTAMP_DIFF
    {
        return Err(ValidationError::ExpiresShortly {
            valid_after: return_info.valid_after,
            valid_until: return_info.valid_until,
        });
    }
    Ok(())
}

/// Maps a `FailedOp` revert onto the client-facing error taxonomy, using the entity
/// attribution of the reason prefix
pub fn classify_failed_op(uo: &UserOperation, failed_op: &FailedOp) -> ValidationError {
    if failed_op.fault() == EntityFault::Paymaster {
        if let Some(paymaster) = uo.paymaster() {
            return ValidationError::PaymasterSimulation {
                paymaster,
                message: failed_op.reason.clone(),
            };
        }
    }

    let entity = match failed_op.fault() {
        EntityFault::Factory => "factory",
        _ => "account",
    };
    ValidationError::Simulation {
        message: format!("{entity} validation failed: {}", failed_op.reason),
    }
}
