use crate::ReputationError;
use ethers::types::{Address, Bytes, U256};
use operon_primitives::{
    constants::validation::reputation::CRASHED_OPS_SEEN,
    get_address,
    reputation::{ReputationEntry, StakeInfo, Status},
};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Rolling-window reputation registry for the entities involved in user
/// operations (factories, paymasters, aggregators and senders).
///
/// Cheap to clone; clones share the underlying registry.
#[derive(Clone, Debug)]
pub struct Reputation {
    /// Minimum denominator for calculating the minimum expected inclusions
    min_inclusion_denominator: u64,
    /// Constant for calculating the throttling threshold
    throttling_slack: u64,
    /// Constant for calculating the ban threshold
    ban_slack: u64,
    /// Minimum stake amount
    min_stake: U256,
    /// Minimum time required to unstake (seconds)
    min_unstake_delay: U256,
    /// Whitelisted addresses
    whitelist: Arc<RwLock<HashSet<Address>>>,
    /// Blacklisted addresses
    blacklist: Arc<RwLock<HashSet<Address>>>,
    /// Entities' reputation registry
    entities: Arc<RwLock<HashMap<Address, ReputationEntry>>>,
}

impl Reputation {
    pub fn new(
        min_inclusion_denominator: u64,
        throttling_slack: u64,
        ban_slack: u64,
        min_stake: U256,
        min_unstake_delay: U256,
    ) -> Self {
        Self {
            min_inclusion_denominator,
            throttling_slack,
            ban_slack,
            min_stake,
            min_unstake_delay,
            whitelist: Arc::new(RwLock::new(HashSet::new())),
            blacklist: Arc::new(RwLock::new(HashSet::new())),
            entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Increase the number of times an entity's address has been seen
    pub fn increment_seen(&self, addr: &Address) {
        let mut entities = self.entities.write();
        let ent = entities.entry(*addr).or_insert_with(|| ReputationEntry::default_with_addr(*addr));
        ent.ops_seen += 1;
    }

    /// Increase the number of times an entity's user operation was included in a block
    pub fn increment_included(&self, addr: &Address) {
        let mut entities = self.entities.write();
        let ent = entities.entry(*addr).or_insert_with(|| ReputationEntry::default_with_addr(*addr));
        ent.ops_included += 1;
    }

    /// Mark an entity that caused `handleOps` to revert; the anti-griefing hammer
    pub fn crashed_handle_ops(&self, addr: &Address) {
        let mut entities = self.entities.write();
        let ent = entities.entry(*addr).or_insert_with(|| ReputationEntry::default_with_addr(*addr));
        ent.ops_seen = CRASHED_OPS_SEEN;
        ent.ops_included = 0;
    }

    /// Decay both counters by 23/24 and evict entries that reach zero; gives roughly
    /// exponential decay with a ~24-hour time constant when invoked hourly
    pub fn update_hourly(&self) {
        let mut entities = self.entities.write();
        for ent in entities.values_mut() {
            ent.ops_seen = ent.ops_seen * 23 / 24;
            ent.ops_included = ent.ops_included * 23 / 24;
        }
        entities.retain(|_, ent| ent.ops_seen > 0 || ent.ops_included > 0);
    }

    /// Add an address to the whitelist
    pub fn add_whitelist(&self, addr: &Address) -> bool {
        self.whitelist.write().insert(*addr)
    }

    /// Remove an address from the whitelist
    pub fn remove_whitelist(&self, addr: &Address) -> bool {
        self.whitelist.write().remove(addr)
    }

    /// Check if an address is in the whitelist
    pub fn is_whitelist(&self, addr: &Address) -> bool {
        self.whitelist.read().contains(addr)
    }

    /// Add an address to the blacklist
    pub fn add_blacklist(&self, addr: &Address) -> bool {
        self.blacklist.write().insert(*addr)
    }

    /// Remove an address from the blacklist
    pub fn remove_blacklist(&self, addr: &Address) -> bool {
        self.blacklist.write().remove(addr)
    }

    /// Check if an address is in the blacklist
    pub fn is_blacklist(&self, addr: &Address) -> bool {
        self.blacklist.read().contains(addr)
    }

    /// Get an entity's reputation status
    pub fn status(&self, addr: &Address) -> Status {
        if self.is_whitelist(addr) {
            return Status::OK;
        }

        if self.is_blacklist(addr) {
            return Status::BANNED;
        }

        match self.entities.read().get(addr) {
            Some(ent) => {
                let min_expected_included = ent.ops_seen / self.min_inclusion_denominator;
                if min_expected_included <= ent.ops_included + self.throttling_slack {
                    Status::OK
                } else if min_expected_included <= ent.ops_included + self.ban_slack {
                    Status::THROTTLED
                } else {
                    Status::BANNED
                }
            }
            None => Status::OK,
        }
    }

    /// Reputation status of the entity whose address occupies the first 20 bytes of
    /// `buf` (`init_code` or `paymaster_and_data`); `OK` when no address is present
    pub fn status_from_bytes(&self, buf: &Bytes) -> Status {
        match get_address(buf) {
            Some(addr) => self.status(&addr),
            None => Status::OK,
        }
    }

    /// Verify the stake information of an entity
    ///
    /// # Returns
    /// * `Ok(())` if the entity's stake is valid
    /// * `Err(ReputationError::BannedEntity)` if the entity is banned
    /// * `Err(ReputationError::StakeTooLow)` if the entity's stake is too low
    /// * `Err(ReputationError::UnstakeDelayTooLow)` if the entity unstakes too early
    pub fn check_stake(
        &self,
        entity: &str,
        info: Option<&StakeInfo>,
    ) -> Result<(), ReputationError> {
        let info = match info {
            Some(info) => info,
            None => return Ok(()),
        };

        if self.is_whitelist(&info.address) {
            return Ok(());
        }

        if self.status(&info.address) == Status::BANNED {
            return Err(ReputationError::BannedEntity {
                entity: entity.into(),
                address: info.address,
            });
        }

        if info.stake < self.min_stake {
            return Err(ReputationError::StakeTooLow {
                entity: entity.into(),
                address: info.address,
                stake: info.stake,
                min_stake: self.min_stake,
            });
        }

        if info.unstake_delay < self.min_unstake_delay {
            return Err(ReputationError::UnstakeDelayTooLow {
                entity: entity.into(),
                address: info.address,
                unstake_delay: info.unstake_delay,
                min_unstake_delay: self.min_unstake_delay,
            });
        }

        Ok(())
    }

    /// Overwrite the reputation entries of the given entities (debug API)
    pub fn set_entries(&self, entries: Vec<ReputationEntry>) {
        let mut entities = self.entities.write();
        for ent in entries {
            entities.insert(ent.address, ent);
        }
    }

    /// All reputation entries with their current status
    pub fn get_all(&self) -> Vec<ReputationEntry> {
        self.entities
            .read()
            .values()
            .map(|ent| ReputationEntry { status: self.status(&ent.address), ..ent.clone() })
            .collect()
    }

    /// Clear all reputation entries
    pub fn clear(&self) {
        self.entities.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use operon_primitives::constants::validation::reputation::{
        BAN_SLACK, MIN_INCLUSION_RATE_DENOMINATOR, THROTTLING_SLACK,
    };

    fn reputation() -> Reputation {
        Reputation::new(
            MIN_INCLUSION_RATE_DENOMINATOR,
            THROTTLING_SLACK,
            BAN_SLACK,
            U256::from(1),
            U256::from(0),
        )
    }

    #[test]
    fn lists_and_status() {
        let rep = reputation();
        let addrs: Vec<Address> = (0..5).map(|_| Address::random()).collect();

        assert!(rep.add_whitelist(&addrs[2]));
        assert!(rep.add_blacklist(&addrs[1]));

        assert!(rep.is_whitelist(&addrs[2]));
        assert!(!rep.is_whitelist(&addrs[1]));
        assert!(rep.is_blacklist(&addrs[1]));
        assert!(!rep.is_blacklist(&addrs[2]));

        assert!(rep.remove_whitelist(&addrs[2]));
        assert!(!rep.remove_whitelist(&addrs[1]));
        assert!(rep.remove_blacklist(&addrs[1]));
        assert!(!rep.remove_blacklist(&addrs[2]));

        assert!(rep.add_whitelist(&addrs[2]));
        assert!(rep.add_blacklist(&addrs[1]));

        assert_eq!(rep.status(&addrs[2]), Status::OK);
        assert_eq!(rep.status(&addrs[1]), Status::BANNED);
        assert_eq!(rep.status(&addrs[3]), Status::OK);
    }

    #[test]
    fn status_thresholds() {
        let rep = reputation();
        let addr = Address::random();

        // unknown entity is ok
        assert_eq!(rep.status(&addr), Status::OK);

        rep.set_entries(vec![ReputationEntry {
            address: addr,
            ops_seen: 300,
            ops_included: 20,
            status: Status::OK,
        }]);
        // 300 / 10 = 30 <= 20 + 10
        assert_eq!(rep.status(&addr), Status::OK);

        rep.set_entries(vec![ReputationEntry {
            address: addr,
            ops_seen: 320,
            ops_included: 20,
            status: Status::OK,
        }]);
        // 32 > 30, 32 <= 70
        assert_eq!(rep.status(&addr), Status::THROTTLED);

        rep.set_entries(vec![ReputationEntry {
            address: addr,
            ops_seen: 710,
            ops_included: 2,
            status: Status::OK,
        }]);
        // 71 > 52
        assert_eq!(rep.status(&addr), Status::BANNED);
    }

    #[test]
    fn crashed_entity_gets_throttled_then_banned() {
        let rep = reputation();
        let addr = Address::random();

        rep.increment_seen(&addr);
        rep.increment_included(&addr);
        rep.crashed_handle_ops(&addr);

        let ent = rep
            .get_all()
            .into_iter()
            .find(|ent| ent.address == addr)
            .expect("entry must exist after crash");
        assert_eq!(ent.ops_seen, 100);
        assert_eq!(ent.ops_included, 0);

        for _ in 0..250 {
            rep.increment_seen(&addr);
        }
        assert_eq!(rep.status(&addr), Status::THROTTLED);

        for _ in 0..500 {
            rep.increment_seen(&addr);
        }
        assert_eq!(rep.status(&addr), Status::BANNED);
    }

    #[test]
    fn hourly_decay_reaches_fixpoint() {
        let rep = reputation();
        for i in 0..10 {
            let addr = Address::random();
            rep.set_entries(vec![ReputationEntry {
                address: addr,
                ops_seen: 100 * (i + 1),
                ops_included: 7 * i,
                status: Status::OK,
            }]);
        }

        let mut rounds = 0;
        while !rep.get_all().is_empty() {
            rep.update_hourly();
            rounds += 1;
            assert!(rounds < 500, "decay must evict every entry in a finite number of steps");
        }
    }

    #[test]
    fn stake_verification() {
        let rep = Reputation::new(
            MIN_INCLUSION_RATE_DENOMINATOR,
            THROTTLING_SLACK,
            BAN_SLACK,
            U256::from(100),
            U256::from(3600),
        );
        let addr = Address::random();

        // absent entity is fine
        assert!(rep.check_stake("paymaster", None).is_ok());

        let low_stake =
            StakeInfo { address: addr, stake: U256::from(99), unstake_delay: U256::from(3600) };
        assert!(matches!(
            rep.check_stake("paymaster", Some(&low_stake)),
            Err(ReputationError::StakeTooLow { .. })
        ));

        let low_delay =
            StakeInfo { address: addr, stake: U256::from(100), unstake_delay: U256::from(10) };
        assert!(matches!(
            rep.check_stake("paymaster", Some(&low_delay)),
            Err(ReputationError::UnstakeDelayTooLow { .. })
        ));

        let ok = StakeInfo { address: addr, stake: U256::from(100), unstake_delay: U256::from(3600) };
        assert!(rep.check_stake("paymaster", Some(&ok)).is_ok());

        // whitelist short-circuits the stake requirements
        rep.add_whitelist(&addr);
        assert!(rep.check_stake("paymaster", Some(&low_stake)).is_ok());
        rep.remove_whitelist(&addr);

        rep.add_blacklist(&addr);
        assert!(matches!(
            rep.check_stake("paymaster", Some(&ok)),
            Err(ReputationError::BannedEntity { .. })
        ));
    }

    #[test]
    fn status_from_first_twenty_bytes() {
        let rep = reputation();
        let addr = Address::random();
        rep.add_blacklist(&addr);

        let mut buf = addr.as_bytes().to_vec();
        buf.extend_from_slice(&[0xff; 8]);
        assert_eq!(rep.status_from_bytes(&Bytes::from(buf)), Status::BANNED);
        assert_eq!(rep.status_from_bytes(&Bytes::default()), Status::OK);
    }
}
