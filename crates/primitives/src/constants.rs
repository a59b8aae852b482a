//! Account abstraction (ERC-4337)-related constants

/// Entry point smart contract
pub mod entry_point {
    /// Address of the entry point smart contract
    pub const ADDRESS: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    /// Version of the entry point smart contract
    pub const VERSION: &str = "0.6.0";
}

/// Bundler
pub mod bundler {
    /// Default time interval for auto bundling mode (in seconds)
    pub const BUNDLE_INTERVAL: u64 = 10;
    /// Interval for polling the receipt of a submitted bundle transaction (in milliseconds)
    pub const RECEIPT_POLL_INTERVAL: u64 = 500;
}

/// User operation mempool
pub mod mempool {
    /// Maximum number of user operations a non-staked sender can have in the mempool
    pub const MAX_USER_OPERATIONS_PER_SENDER: usize = 4;
    /// Percentage increase of gas fees required to replace a user operation in the mempool
    pub const GAS_INCREASE_PERC: u64 = 10;
    /// Depth scan when searching for previous user operation events
    pub const LATEST_SCAN_DEPTH: u64 = 1000;
}

/// User operation validation
pub mod validation {
    /// Entities involved in a user operation
    pub mod entities {
        pub const FACTORY: &str = "factory";
        pub const SENDER: &str = "account";
        pub const PAYMASTER: &str = "paymaster";
        pub const AGGREGATOR: &str = "aggregator";
    }

    /// Reputation
    /// <https://github.com/eth-infinitism/account-abstraction/blob/develop/eip/EIPS/eip-aa-rules.md#constants>
    pub mod reputation {
        pub const MIN_UNSTAKE_DELAY: u64 = 86400;
        // MIN_STAKE_VALUE - adjustable per chain value, equivalent to ~$1000 in native tokens
        pub const MIN_INCLUSION_RATE_DENOMINATOR: u64 = 10;
        pub const CLIENT_MIN_INCLUSION_RATE_DENOMINATOR: u64 = 100;
        pub const THROTTLING_SLACK: u64 = 10;
        pub const BAN_SLACK: u64 = 50;
        /// Number of user operations per throttled entity allowed in a single bundle
        pub const THROTTLED_ENTITY_BUNDLE_COUNT: u64 = 1;
        /// Value `ops_seen` is set to when an entity makes `handleOps` revert
        pub const CRASHED_OPS_SEEN: u64 = 100;
    }

    /// Simulation
    pub mod simulation {
        /// Minimum number of seconds a user operation must stay valid to be accepted
        pub const EXPIRATION_TIMESTAMP_DIFF: u64 = 30;
    }
}

/// Events
pub mod events {
    /// Number of blocks scanned backwards when bootstrapping the event manager
    pub const BOOTSTRAP_BLOCKS: u64 = 86400;
}

/// RPC
pub mod rpc {
    /// The default port for HTTP
    pub const HTTP_PORT: u16 = 3000;
    /// The default port for WS
    pub const WS_PORT: u16 = 3001;

    /// JSON-RPC error codes (ERC-4337)
    pub mod error_codes {
        pub const INVALID_FIELDS: i32 = -32602;
        pub const SIMULATE_VALIDATION: i32 = -32500;
        pub const SIMULATE_PAYMASTER_VALIDATION: i32 = -32501;
        pub const OPCODE_VALIDATION: i32 = -32502;
        pub const EXPIRES_SHORTLY: i32 = -32503;
        pub const REPUTATION: i32 = -32504;
        pub const INSUFFICIENT_STAKE: i32 = -32505;
        pub const UNSUPPORTED_AGGREGATOR: i32 = -32506;
        pub const INVALID_SIGNATURE: i32 = -32507;
        pub const USER_OPERATION_REVERTED: i32 = -32521;
    }
}
