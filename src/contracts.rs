// src/contracts.rs
use ethers::contract::abigen;

use crate::types;

// EntryPoint v0.6, reduced to what the relay calls.
abigen!(
    IEntryPoint,
    r#"[
        struct UserOperation {address sender;uint256 nonce;bytes initCode;bytes callData;uint256 callGasLimit;uint256 verificationGasLimit;uint256 preVerificationGas;uint256 maxFeePerGas;uint256 maxPriorityFeePerGas;bytes paymasterAndData;bytes signature;}
        function handleOps(UserOperation[] calldata ops, address payable beneficiary) external
        function simulateValidation(UserOperation calldata userOp) external
        error FailedOp(uint256 opIndex, string reason)
    ]"#
);

/// Revert signature of a successful `simulateValidation`.
pub const VALIDATION_RESULT_SIGNATURE: &str = "ValidationResult((uint256,uint256,bool,uint48,uint48,bytes),(uint256,uint256),(uint256,uint256),(uint256,uint256))";

/// Revert signature of a successful `simulateValidation` for an aggregated account.
pub const VALIDATION_RESULT_WITH_AGGREGATION_SIGNATURE: &str = "ValidationResultWithAggregation((uint256,uint256,bool,uint48,uint48,bytes),(uint256,uint256),(uint256,uint256),(uint256,uint256),(address,(uint256,uint256)))";

impl From<types::UserOperation> for UserOperation {
    fn from(op: types::UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.init_code,
            call_data: op.call_data,
            call_gas_limit: op.call_gas_limit,
            verification_gas_limit: op.verification_gas_limit,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data: op.paymaster_and_data,
            signature: op.signature,
        }
    }
}
