//! Live gas benchmarking for EVM contracts.
//!
//! Contracts are deployed and exercised against local forks of live networks, so every gas
//! figure comes from a real receipt. Network-specific fee structure (L1 fee market, rollup
//! execution plus data posting) is then layered on top to produce dollar-denominated
//! comparisons across networks.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod error;
pub use error::*;

mod types;
pub use types::*;

mod config;
pub use config::*;

mod network;
pub use network::*;

mod artifact;
pub use artifact::*;

pub mod analyzer;
pub use analyzer::{analyze, BytecodeReport};

pub mod fork;
pub use fork::{AnvilBackend, ForkBackend, ForkManager, TeardownReport};

pub mod engine;
pub use engine::{CallPlan, ExecutionEngine, ForkClient, RpcForkClient};

pub mod fees;
pub use fees::{compose_fees, FeeOracle, PriceFeed, RpcFeeOracle, StaticFeeOracle, StaticPriceFeed};

mod aggregate;
pub use aggregate::*;

mod benchmark;
pub use benchmark::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
