//! User operation request (optional fields)

use super::UserOperation;
use crate::utils::as_checksum_addr_opt;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// User operation with all fields being optional; the shape clients submit over
/// JSON-RPC. Presence of the required fields is enforced by the validation
/// manager, not by the wire codec.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationRequest {
    #[serde(default, serialize_with = "as_checksum_addr_opt")]
    pub sender: Option<Address>,
    #[serde(default)]
    pub nonce: Option<U256>,
    #[serde(default)]
    pub init_code: Option<Bytes>,
    #[serde(default)]
    pub call_data: Option<Bytes>,
    #[serde(default)]
    pub call_gas_limit: Option<U256>,
    #[serde(default)]
    pub verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub pre_verification_gas: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub paymaster_and_data: Option<Bytes>,
    #[serde(default)]
    pub signature: Option<Bytes>,
}

impl From<UserOperationRequest> for UserOperation {
    fn from(request: UserOperationRequest) -> Self {
        Self {
            sender: request.sender.unwrap_or_default(),
            nonce: request.nonce.unwrap_or_default(),
            init_code: request.init_code.unwrap_or_default(),
            call_data: request.call_data.unwrap_or_default(),
            call_gas_limit: request.call_gas_limit.unwrap_or_default(),
            verification_gas_limit: request.verification_gas_limit.unwrap_or_default(),
            pre_verification_gas: request.pre_verification_gas.unwrap_or_default(),
            max_fee_per_gas: request.max_fee_per_gas.unwrap_or_default(),
            max_priority_fee_per_gas: request.max_priority_fee_per_gas.unwrap_or_default(),
            paymaster_and_data: request.paymaster_and_data.unwrap_or_default(),
            signature: request.signature.unwrap_or_default(),
        }
    }
}

impl From<UserOperation> for UserOperationRequest {
    fn from(uo: UserOperation) -> Self {
        Self {
            sender: Some(uo.sender),
            nonce: Some(uo.nonce),
            init_code: Some(uo.init_code),
            call_data: Some(uo.call_data),
            call_gas_limit: Some(uo.call_gas_limit),
            verification_gas_limit: Some(uo.verification_gas_limit),
            pre_verification_gas: Some(uo.pre_verification_gas),
            max_fee_per_gas: Some(uo.max_fee_per_gas),
            max_priority_fee_per_gas: Some(uo.max_priority_fee_per_gas),
            paymaster_and_data: Some(uo.paymaster_and_data),
            signature: Some(uo.signature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_conversion_fills_defaults() {
        let req = UserOperationRequest {
            sender: Some("0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap()),
            nonce: Some(7.into()),
            ..Default::default()
        };
        let uo = UserOperation::from(req);
        assert_eq!(uo.nonce, 7.into());
        assert_eq!(uo.init_code, Bytes::default());
        assert_eq!(uo.call_gas_limit, U256::zero());
        assert_eq!(uo.signature, Bytes::default());
    }

    #[test]
    fn request_wire_encoding() {
        let json = r#"{"sender":"0x9c5754De1443984659E1b3a8d1931D83475ba29C","nonce":"0x1","callData":"0xb61d27f6","maxFeePerGas":"0x3b9aca00"}"#;
        let req: UserOperationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.nonce, Some(1.into()));
        assert_eq!(req.max_fee_per_gas, Some(1_000_000_000.into()));
        assert!(req.signature.is_none());
        assert!(req.init_code.is_none());
    }
}
