use ethers::types::U256;
use operon_primitives::UserOperation;
use std::ops::Deref;

/// Struct to calculate the pre-verification gas of a user operation
// https://github.com/eth-infinitism/bundler/blob/main/packages/sdk/src/calcPreVerificationGas.ts#L44-L51
pub struct Overhead {
    pub fixed: U256,
    pub per_user_op: U256,
    pub per_user_op_word: U256,
    pub zero_byte: U256,
    pub non_zero_byte: U256,
    pub bundle_size: U256,
    pub sig_size: U256,
}

impl Default for Overhead {
    fn default() -> Self {
        Self {
            fixed: U256::from(21000),
            per_user_op: U256::from(18300),
            per_user_op_word: U256::from(4),
            zero_byte: U256::from(4),
            non_zero_byte: U256::from(16),
            bundle_size: U256::from(1),
            sig_size: U256::from(65),
        }
    }
}

impl Overhead {
    /// Calculates the pre-verification gas of a [UserOperation](UserOperation).
    /// The operation is packed with a synthetic `0x01`-filled signature when the signature is
    /// still absent, and a placeholder `pre_verification_gas` when the field is not set yet, so
    /// that the estimate covers the calldata the bundle transaction will actually carry.
    pub fn calculate_pre_verification_gas(&self, uo: &UserOperation) -> U256 {
        let mut uo = uo.clone();
        if uo.pre_verification_gas.is_zero() {
            uo = uo.pre_verification_gas(self.fixed);
        }
        if uo.signature.is_empty() {
            uo = uo.signature(vec![1u8; self.sig_size.as_usize()].into());
        }

        let uo_pack = uo.pack();

        let call_data_cost = uo_pack.deref().iter().fold(U256::zero(), |acc, &byte| {
            let byte_cost = if byte == 0 { &self.zero_byte } else { &self.non_zero_byte };
            acc.saturating_add(*byte_cost)
        });

        let length_in_words = div_ceil(U256::from(uo_pack.len()), U256::from(32));
        let word_cost = self.per_user_op_word.saturating_mul(length_in_words);

        div_ceil(self.fixed, self.bundle_size)
            .saturating_add(call_data_cost)
            .saturating_add(self.per_user_op)
            .saturating_add(word_cost)
    }
}

/// Helper function to calculate the minimum fee a replacement user operation must offer,
/// given the fee of the replaced one and the required increase percentage
pub fn calculate_valid_gas(gas_price: U256, gas_incr_perc: U256) -> U256 {
    // gas_price * (1 + gas_incr_perc / 100)
    // -> (gas_price * (100 + gas_incr_perc)) / 100 + rounding_const
    let denominator = U256::from(100);
    let numerator = gas_price.saturating_mul(gas_incr_perc.saturating_add(denominator));
    div_ceil(numerator, denominator)
}

/// Performs division and rounds up to the nearest integer.
pub fn div_ceil(numerator: U256, denominator: U256) -> U256 {
    let rounding_const =
        U256::from(if numerator.checked_rem(denominator).unwrap_or_default() > U256::zero() {
            1
        } else {
            0
        });
    numerator.checked_div(denominator).unwrap_or_default().saturating_add(rounding_const)
}
