//! Misc utils

use ethers::{
    types::{Address, U256},
    utils::to_checksum,
};

/// Converts address to checksum address
pub fn as_checksum_addr<S>(val: &Address, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&to_checksum(val, None))
}

/// Converts Option address to checksum
pub fn as_checksum_addr_opt<S>(val: &Option<Address>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if let Some(addr) = val {
        s.serialize_str(&to_checksum(addr, None))
    } else {
        s.serialize_none()
    }
}

/// If possible, parses address from the first 20 bytes
pub fn get_address(buf: &[u8]) -> Option<Address> {
    if buf.len() >= 20 {
        Some(Address::from_slice(&buf[0..20]))
    } else {
        None
    }
}

/// Parses address from string (CLI helper)
pub fn parse_address(s: &str) -> Result<Address, String> {
    s.parse::<Address>().map_err(|_| format!("address {s} is not valid"))
}

/// Parses U256 from decimal or 0x-prefixed hex string (CLI helper)
pub fn parse_u256(s: &str) -> Result<U256, String> {
    if let Some(hex) = s.strip_prefix("0x") {
        U256::from_str_radix(hex, 16).map_err(|_| format!("{s} is not a valid hex number"))
    } else {
        U256::from_dec_str(s).map_err(|_| format!("{s} is not a valid number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_from_prefix_bytes() {
        let buf: Vec<u8> = vec![0xab; 25];
        assert_eq!(get_address(&buf), Some(Address::from_slice(&[0xab; 20])));
        assert_eq!(get_address(&buf[0..19]), None);
        assert_eq!(get_address(&[]), None);
    }

    #[test]
    fn u256_parsing() {
        assert_eq!(parse_u256("1000").unwrap(), U256::from(1000));
        assert_eq!(parse_u256("0x3e8").unwrap(), U256::from(1000));
        assert!(parse_u256("xyz").is_err());
    }
}
