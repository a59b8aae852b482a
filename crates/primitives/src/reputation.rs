//! Primitives for reputation

use crate::utils::as_checksum_addr;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_hex::{CompactPfx, SerHex};

pub type ReputationStatus = u64;

/// All possible reputation statuses
#[derive(Default, Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    OK,
    THROTTLED,
    BANNED,
}

impl From<Status> for ReputationStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::OK => 0,
            Status::THROTTLED => 1,
            Status::BANNED => 2,
        }
    }
}

impl From<ReputationStatus> for Status {
    fn from(status: ReputationStatus) -> Self {
        match status {
            0 => Status::OK,
            1 => Status::THROTTLED,
            2 => Status::BANNED,
            _ => Status::OK,
        }
    }
}

/// Reputation entry for entities (factories, paymasters, aggregators)
#[derive(Default, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReputationEntry {
    #[serde(serialize_with = "as_checksum_addr")]
    pub address: Address,
    #[serde(rename = "opsSeen", with = "SerHex::<CompactPfx>")]
    pub ops_seen: u64,
    #[serde(rename = "opsIncluded", with = "SerHex::<CompactPfx>")]
    pub ops_included: u64,
    #[serde(default, skip_deserializing)]
    pub status: Status,
}

impl ReputationEntry {
    pub fn default_with_addr(addr: Address) -> Self {
        Self { address: addr, ops_seen: 0, ops_included: 0, status: Status::OK }
    }
}

/// Stake info of an entity, as reported by the entry point during simulation
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StakeInfo {
    #[serde(rename = "addr", serialize_with = "as_checksum_addr")]
    pub address: Address,
    pub stake: U256,
    #[serde(rename = "unstakeDelaySec")]
    pub unstake_delay: U256, // seconds
}

impl StakeInfo {
    pub fn is_staked(&self) -> bool {
        self.stake > U256::zero() && self.unstake_delay > U256::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [Status::OK, Status::THROTTLED, Status::BANNED] {
            assert_eq!(Status::from(ReputationStatus::from(status)), status);
        }
        assert_eq!(Status::from(42u64), Status::OK);
    }

    #[test]
    fn reputation_entry_wire_encoding() {
        let entry = ReputationEntry {
            address: "0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap(),
            ops_seen: 100,
            ops_included: 26,
            status: Status::OK,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["opsSeen"], "0x64");
        assert_eq!(json["opsIncluded"], "0x1a");
        assert_eq!(json["address"], "0x9c5754De1443984659E1b3a8d1931D83475ba29C");

        let back: ReputationEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.ops_seen, entry.ops_seen);
        assert_eq!(back.ops_included, entry.ops_included);
    }

    #[test]
    fn stake_info_staked() {
        let mut info = StakeInfo {
            address: Address::random(),
            stake: U256::from(1),
            unstake_delay: U256::from(1),
        };
        assert!(info.is_staked());
        info.stake = U256::zero();
        assert!(!info.is_staked());
    }
}
