use crate::gen::{EntryPointAPIErrors, FailedOp};
use ethers::{
    abi::AbiDecode,
    providers::{JsonRpcError, Middleware, MiddlewareError, ProviderError},
    types::Bytes,
};
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

/// Selector of `Error(string)`, the shape `require(..., "reason")` reverts with
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// The entity an entry point `AAxx` revert reason points at.
///
/// Drives both the client-facing error classification during validation and the
/// reputation punishment after a failing bundle; the prefix is parsed here, once,
/// next to the `FailedOp` type it comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityFault {
    Factory,
    Account,
    Paymaster,
    /// The reason carries no entity prefix this bundler attributes
    Unknown,
}

impl FailedOp {
    /// Attributes the failure by the reason prefix: `AA1*` faults the factory,
    /// `AA2*` the account, `AA3*` the paymaster
    pub fn fault(&self) -> EntityFault {
        if self.reason.starts_with("AA1") {
            EntityFault::Factory
        } else if self.reason.starts_with("AA2") {
            EntityFault::Account
        } else if self.reason.starts_with("AA3") {
            EntityFault::Paymaster
        } else {
            EntityFault::Unknown
        }
    }
}

/// Entry point errors
#[derive(Debug, Error, Clone)]
pub enum EntryPointError {
    /// Failed user operation error
    #[error("{0}")]
    FailedOp(FailedOp),

    /// Execution reverted
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    /// There is no revert when there should be
    #[error("{function} should revert")]
    NoRevert {
        /// function
        function: String,
    },

    /// Provider error
    #[error("provider error: {inner}")]
    Provider {
        /// The inner error message
        inner: String,
    },

    /// ABI error
    #[error("abi error: {inner}")]
    ABI {
        /// The inner error message
        inner: String,
    },

    /// Data decoding error
    #[error("decode error: {inner}")]
    Decode {
        /// The inner error message
        inner: String,
    },

    /// Any other error
    #[error("other error: {inner}")]
    Other {
        /// The inner error message
        inner: String,
    },
}

impl EntryPointError {
    pub fn from_middleware_error<M: Middleware>(
        err: M::Error,
    ) -> Result<EntryPointAPIErrors, Self> {
        if let Some(err) = err.as_error_response() {
            return Self::from_json_rpc_error(err);
        }

        if let Some(err) = err.as_provider_error() {
            return Self::from_provider_error(err);
        }

        Err(Self::Provider { inner: format!("middleware error: {err:?}") })
    }

    pub fn from_provider_error(err: &ProviderError) -> Result<EntryPointAPIErrors, Self> {
        match err {
            ProviderError::JsonRpcClientError(err) => match err.as_error_response() {
                Some(err) => Self::from_json_rpc_error(err),
                None => Err(Self::Provider {
                    inner: format!("unknown json-rpc client error: {err:?}"),
                }),
            },
            ProviderError::HTTPError(err) => {
                Err(Self::Provider { inner: format!("HTTP error: {err:?}") })
            }
            _ => Err(Self::Provider { inner: format!("unknown provider error: {err:?}") }),
        }
    }

    /// Execution clients report reverts of `eth_call`/`eth_estimateGas` through the
    /// `data` field of the json-rpc error; pull the hex payload out and decode it into
    /// the entry point's typed errors
    pub fn from_json_rpc_error(err: &JsonRpcError) -> Result<EntryPointAPIErrors, Self> {
        let data = revert_data(err)?;

        decode_revert_error(data).map_err(|err| Self::Provider {
            inner: format!("failed to decode revert error: {err:?}"),
        })
    }
}

/// Extracts the revert bytes from the `data` field of a json-rpc error; some clients
/// wrap the hex payload in prose, so the first hex run in the string wins
fn revert_data(err: &JsonRpcError) -> Result<Bytes, EntryPointError> {
    let value = err.data.as_ref().ok_or_else(|| EntryPointError::Provider {
        inner: format!("json-rpc error doesn't contain data field: {err:?}"),
    })?;

    let data = value.as_str().ok_or_else(|| EntryPointError::Decode {
        inner: format!("json-rpc return data is not a string: {value:?}"),
    })?;

    let re = Regex::new(r"0x[0-9a-fA-F]+").expect("Regex rules valid");
    let hex = re.find(data).ok_or_else(|| EntryPointError::Decode {
        inner: format!("hex string not found in {data:?}"),
    })?;

    Bytes::from_str(hex.as_str()).map_err(|err| EntryPointError::Decode {
        inner: format!("string {data:?} could not be converted to bytes: {err:?}"),
    })
}

/// Decodes revert data into the entry point's typed errors. The derived decoder does
/// not understand `require`-style reverts, so the `Error(string)` envelope is unwrapped
/// by hand as a fallback
pub fn decode_revert_error(data: Bytes) -> Result<EntryPointAPIErrors, EntryPointError> {
    match EntryPointAPIErrors::decode(data.as_ref()) {
        Ok(decoded) => Ok(decoded),
        Err(err) => match decode_revert_string(&data) {
            Some(reason) => Ok(EntryPointAPIErrors::RevertString(reason)),
            None => Err(EntryPointError::Decode {
                inner: format!(
                    "data field can't be deserialized to EntryPointAPIErrors error: {err:?}",
                ),
            }),
        },
    }
}

/// Unwraps an `Error(string)` revert into its reason string, if the data has that shape
pub fn decode_revert_string(data: &Bytes) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR)?;
    <String as AbiDecode>::decode(payload).ok()
}
