// src/test_utils.rs
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, Bytes, H256, U256};

use crate::codec::DecodedRequest;
use crate::config::{BundlerConfig, RetryPolicy, DEFAULT_ENTRY_POINT};
use crate::types::{SendUserOperationRequest, UserOperation};

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

pub fn entry_point() -> Address {
    DEFAULT_ENTRY_POINT.parse().unwrap()
}

pub fn sender() -> Address {
    Address::repeat_byte(0x5e)
}

pub fn beneficiary() -> Address {
    Address::repeat_byte(0xbe)
}

pub fn tx_hash() -> H256 {
    H256::repeat_byte(0x7a)
}

pub fn contract_code() -> Bytes {
    Bytes::from(vec![0x60, 0x80, 0x60, 0x40])
}

pub fn config() -> Arc<BundlerConfig> {
    Arc::new(BundlerConfig {
        entry_points: vec![entry_point()],
        beneficiary: beneficiary(),
        max_verification_gas: U256::from(100_000_000_000u64),
        min_priority_fee_per_gas: gwei(1),
        chain_call_timeout: Duration::from_secs(1),
        read_retry: RetryPolicy::default(),
    })
}

/// A counterfactual account deployment that passes every admission rule against a
/// 20 gwei base fee.
pub fn user_operation() -> UserOperation {
    UserOperation {
        sender: sender(),
        nonce: U256::zero(),
        init_code: Bytes::from((1..=10).collect::<Vec<u8>>()),
        call_data: Bytes::new(),
        call_gas_limit: U256::from(100_000),
        verification_gas_limit: U256::from(50_000),
        pre_verification_gas: U256::from(150_000),
        max_fee_per_gas: gwei(50),
        max_priority_fee_per_gas: gwei(2),
        paymaster_and_data: Bytes::new(),
        signature: Bytes::from(vec![0xaa; 65]),
    }
}

pub fn decoded(user_operation: UserOperation) -> DecodedRequest {
    DecodedRequest {
        request: SendUserOperationRequest {
            user_operation,
            entry_point: entry_point(),
        },
        param_count: 1,
    }
}
