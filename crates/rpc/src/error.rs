use ethers::utils::to_checksum;
use jsonrpsee::types::{
    error::{ErrorCode, INTERNAL_ERROR_CODE},
    ErrorObject, ErrorObjectOwned,
};
use operon_bundler::BundlerError;
use operon_mempool::{AdmissionError, MempoolError, ReputationError, ValidationError};
use operon_primitives::constants::rpc::error_codes::{
    EXPIRES_SHORTLY, INSUFFICIENT_STAKE, INVALID_FIELDS, INVALID_SIGNATURE, REPUTATION,
    SIMULATE_PAYMASTER_VALIDATION, SIMULATE_VALIDATION, UNSUPPORTED_AGGREGATOR,
    USER_OPERATION_REVERTED,
};
use serde_json::json;

/// A wrapper for the [ErrorObjectOwned](ErrorObjectOwned) type, carrying the
/// ERC-4337 error codes
pub struct JsonRpcError(pub ErrorObjectOwned);

impl From<JsonRpcError> for ErrorObjectOwned {
    fn from(err: JsonRpcError) -> Self {
        err.0
    }
}

impl From<ReputationError> for JsonRpcError {
    fn from(err: ReputationError) -> Self {
        JsonRpcError(match err {
            ReputationError::BannedEntity { ref entity, ref address } => ErrorObject::owned(
                REPUTATION,
                err.to_string(),
                Some(json!({ entity.clone(): to_checksum(address, None) })),
            ),
            ReputationError::StakeTooLow { .. } => {
                ErrorObject::owned(INSUFFICIENT_STAKE, err.to_string(), None::<bool>)
            }
            ReputationError::UnstakeDelayTooLow { .. } => {
                ErrorObject::owned(INSUFFICIENT_STAKE, err.to_string(), None::<bool>)
            }
        })
    }
}

impl From<ValidationError> for JsonRpcError {
    fn from(err: ValidationError) -> Self {
        JsonRpcError(match err {
            ValidationError::InvalidFields { .. } => {
                ErrorObject::owned(INVALID_FIELDS, err.to_string(), None::<bool>)
            }
            ValidationError::Simulation { .. } => {
                ErrorObject::owned(SIMULATE_VALIDATION, err.to_string(), None::<bool>)
            }
            ValidationError::PaymasterSimulation { paymaster, .. } => ErrorObject::owned(
                SIMULATE_PAYMASTER_VALIDATION,
                err.to_string(),
                Some(json!({ "paymaster": to_checksum(&paymaster, None) })),
            ),
            ValidationError::ExpiresShortly { valid_after, valid_until } => ErrorObject::owned(
                EXPIRES_SHORTLY,
                err.to_string(),
                Some(json!({ "validAfter": valid_after, "validUntil": valid_until })),
            ),
            ValidationError::Reputation(err) => JsonRpcError::from(err).0,
            ValidationError::UnsupportedAggregator { aggregator } => ErrorObject::owned(
                UNSUPPORTED_AGGREGATOR,
                err.to_string(),
                Some(json!({ "aggregator": to_checksum(&aggregator, None) })),
            ),
            ValidationError::InvalidSignature => {
                ErrorObject::owned(INVALID_SIGNATURE, err.to_string(), None::<bool>)
            }
            ValidationError::ExecutionReverted { .. } => {
                ErrorObject::owned(USER_OPERATION_REVERTED, err.to_string(), None::<bool>)
            }
            _ => ErrorObject::owned(INTERNAL_ERROR_CODE, err.to_string(), None::<bool>),
        })
    }
}

impl From<MempoolError> for JsonRpcError {
    fn from(err: MempoolError) -> Self {
        JsonRpcError(match err {
            MempoolError::ReplacementUnderpriced { .. } => {
                ErrorObject::owned(INVALID_FIELDS, err.to_string(), None::<bool>)
            }
            // admitting more operations for this sender requires stake
            MempoolError::TooManyUserOperations { .. } => {
                ErrorObject::owned(INSUFFICIENT_STAKE, err.to_string(), None::<bool>)
            }
        })
    }
}

impl From<AdmissionError> for JsonRpcError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Validation(err) => err.into(),
            AdmissionError::Mempool(err) => err.into(),
        }
    }
}

impl From<BundlerError> for JsonRpcError {
    fn from(err: BundlerError) -> Self {
        JsonRpcError(ErrorObject::owned(
            ErrorCode::InternalError.code(),
            err.to_string(),
            None::<bool>,
        ))
    }
}

impl From<eyre::Report> for JsonRpcError {
    fn from(err: eyre::Report) -> Self {
        JsonRpcError(ErrorObject::owned(
            ErrorCode::InternalError.code(),
            err.to_string(),
            None::<bool>,
        ))
    }
}
