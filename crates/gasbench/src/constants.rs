//! Protocol and tuning constants.
//!
//! Grouped as sub-modules by the component that consumes them.

/// Constants for contract size accounting.
pub mod size {
    /// The EIP-170 runtime code size ceiling, in bytes.
    pub const MAX_CODE_SIZE: usize = 24_576;
    /// Utilization (percent of [`MAX_CODE_SIZE`]) above which a contract is reported as near
    /// the limit.
    pub const NEAR_LIMIT_PERCENTAGE: f64 = 90.0;
}

/// Constants for data posting on rollups.
pub mod data {
    /// The number of bytes carried by one EIP-4844 blob (2^17).
    pub const BLOB_SIZE_BYTES: u64 = 131_072;
    /// Blob gas consumed by one blob.
    pub const GAS_PER_BLOB: u128 = 131_072;
    /// Gas charged per non-zero calldata byte when data is posted as calldata.
    pub const CALLDATA_GAS_PER_BYTE: u64 = 16;
}

/// Constants for unit conversion.
pub mod units {
    /// Wei per gwei.
    pub const WEI_PER_GWEI: f64 = 1e9;
    /// Gwei to native token scale (`1 gwei = 1e-9` token).
    pub const GWEI_TO_NATIVE: f64 = 1e-9;
    /// Wei to native token scale.
    pub const WEI_TO_NATIVE: f64 = 1e-18;
}

/// Constants for the bytecode analyzer.
pub mod analyzer {
    /// How many distinct opcodes are retained in a distribution.
    pub const TOP_OPCODES: usize = 20;
    /// How many instructions after an external call are searched for an `ISZERO` check.
    pub const CALL_CHECK_LOOKAHEAD: usize = 5;
    /// Optimization score every contract starts from.
    pub const BASE_OPTIMIZATION_SCORE: u32 = 100;
    /// Score penalty per occurrence of an expensive opcode.
    pub const EXPENSIVE_OPCODE_PENALTY: u32 = 2;
    /// Estimated gas saved per cached `SLOAD` (cold read minus warm read).
    pub const SLOAD_SAVINGS: u64 = 2_000;
    /// Estimated gas saved per batched `SSTORE` (fresh write minus dirty write).
    pub const SSTORE_SAVINGS: u64 = 2_900;
    /// Estimated gas saved per avoided `KECCAK256` (base plus one word).
    pub const KECCAK256_SAVINGS: u64 = 36;
    /// Estimated gas at which the gas component of the complexity score saturates.
    pub const COMPLEXITY_GAS_CEILING: u64 = 1_000_000;
    /// Function count at which the function component of the complexity score saturates.
    pub const COMPLEXITY_FUNCTION_CEILING: usize = 50;
}

/// Default settings for fork sessions.
pub mod fork {
    /// First port of the reserved range.
    pub const PORT_RANGE_START: u16 = 18_545;
    /// Last port of the reserved range (inclusive).
    pub const PORT_RANGE_END: u16 = 18_645;
    /// How long a fork may take to answer its first liveness probe.
    pub const STARTUP_TIMEOUT_MS: u64 = 60_000;
    /// Delay between liveness probes.
    pub const PROBE_INTERVAL_MS: u64 = 250;
    /// How long a fork gets to exit after a graceful signal before it is killed.
    pub const SHUTDOWN_GRACE_MS: u64 = 3_000;
    /// Host every fork binds to.
    pub const LOCAL_HOST: &str = "127.0.0.1";
}

/// Default settings for fee telemetry.
pub mod fees {
    /// Registry id of the L1 rollups post their data to.
    pub const DEFAULT_L1_NETWORK: &str = "ethereum";
}

/// Default settings for the execution engine.
pub mod engine {
    use alloy_primitives::{address, Address};

    /// The first pre-funded development account of anvil and hardhat.
    pub const DEFAULT_SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    /// Balance (wei) given to the sender on every fresh fork: 10_000 ether.
    pub const FUNDING_BALANCE_WEI: u128 = 10_000 * 1_000_000_000_000_000_000;
    /// How long to wait for a transaction receipt.
    pub const RECEIPT_TIMEOUT_MS: u64 = 30_000;
}
