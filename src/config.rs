// src/config.rs
use std::time::Duration;

use ethers::types::{Address, U256};

use crate::codec::parse_quantity;

/// EntryPoint v0.6 deployment trusted when no allow-list is configured.
pub const DEFAULT_ENTRY_POINT: &str = "0x98CAf6454c05885b730325aFc868C2A5919A2fda";

/// Process-wide settings, built once at startup and never mutated.
#[derive(Clone, Debug)]
pub struct BundlerConfig {
    /// Trusted entry points, in the order `eth_supportedEntryPoints` reports them.
    pub entry_points: Vec<Address>,
    /// Receives the fees of every submitted `handleOps` transaction.
    pub beneficiary: Address,
    pub max_verification_gas: U256,
    pub min_priority_fee_per_gas: U256,
    /// Deadline attached to every chain gateway call.
    pub chain_call_timeout: Duration,
    pub read_retry: RetryPolicy,
}

impl BundlerConfig {
    pub fn is_trusted_entry_point(&self, entry_point: &Address) -> bool {
        self.entry_points.contains(entry_point)
    }
}

/// Backoff schedule for chain reads. Writes are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled after every further failure.
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_millis(100),
            max_wait: Duration::from_secs(2),
        }
    }
}

/// clap value parser for decimal or hex quantities.
pub fn parse_u256(s: &str) -> Result<U256, String> {
    parse_quantity(s)
}
