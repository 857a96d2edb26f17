// src/error.rs
use std::time::Duration;

use ethers::types::{Address, U256};
use jsonrpsee::types::error::{ErrorCode, ErrorObject, ErrorObjectOwned};
use serde_json::json;
use thiserror::Error;

/// Simulation or submission of the operation failed.
pub const TRANSACTION_ERROR_CODE: i32 = -32001;
/// The submission credential was rejected or could not sign.
pub const AUTH_ERROR_CODE: i32 = -32002;
/// The call to the chain could not be built on our side.
pub const CLIENT_ERROR_CODE: i32 = -32003;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed params: {0}")]
    Malformed(String),

    #[error("wrong arity: expected 1 parameter, got 0")]
    MissingParams,

    #[error("params must be a positional array")]
    NotPositional,

    #[error("invalid userOperation envelope: {0}")]
    InvalidEnvelope(String),
}

/// A violated admission rule. Rules are listed in evaluation order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entry point not trusted: {0:?}")]
    EntryPointNotTrusted(Address),

    #[error("wrong arity: expected 1 parameter, got {0}")]
    WrongArity(usize),

    #[error("sender/initCode conflict: sender {0:?} is not a contract and initCode is empty")]
    SenderNotDeployedWithoutInitCode(Address),

    #[error("sender/initCode conflict: sender {0:?} is an existing contract but initCode is nonempty")]
    ExistingSenderWithInitCode(Address),

    #[error("verification gas too high: verificationGasLimit is {0} but must be at most {1}")]
    VerificationGasTooHigh(U256, U256),

    #[error("preVerificationGas too low: preVerificationGas is {0} but must be at least {1}")]
    PreVerificationGasTooLow(U256, U256),

    #[error("preVerificationGas too low: callGasLimit {0} plus verificationGasLimit {1} exceeds 2^256 - 1")]
    GasLimitsOverflow(U256, U256),

    #[error("paymaster invalid: paymasterAndData must start with a 20-byte address, but was only {0} bytes")]
    PaymasterTooShort(usize),

    #[error("paymaster invalid: paymaster {0:?} has no code")]
    PaymasterNotDeployed(Address),

    #[error("max fee too low: maxFeePerGas is {0} but must exceed the base fee {1}")]
    MaxFeeTooLow(U256, U256),

    #[error("priority fee too low: maxPriorityFeePerGas is {0} but must exceed {1}")]
    PriorityFeeTooLow(U256, U256),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Ethereum provider error: {0}")]
    Provider(String),

    #[error("contract call failed: {0}")]
    Contract(String),

    #[error("could not encode contract call: {0}")]
    Encoding(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("latest block unavailable: {0}")]
    BlockUnavailable(&'static str),

    #[error("{call} timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundlerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("chain read failed: {0}")]
    ChainRead(GatewayError),

    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    #[error("simulation call failed: {0}")]
    SimulationCall(GatewayError),

    #[error("handleOps submission failed: {0}")]
    Submission(GatewayError),
}

impl BundlerError {
    /// JSON-RPC error code reported for this failure.
    pub fn code(&self) -> i32 {
        match self {
            BundlerError::Decode(DecodeError::Malformed(_)) => ErrorCode::ParseError.code(),
            BundlerError::Decode(_) | BundlerError::Validation(_) => {
                ErrorCode::InvalidParams.code()
            }
            BundlerError::ChainRead(_) => ErrorCode::InternalError.code(),
            BundlerError::SimulationFailed(_) => TRANSACTION_ERROR_CODE,
            BundlerError::SimulationCall(err) | BundlerError::Submission(err) => match err {
                GatewayError::Timeout { .. } => ErrorCode::InternalError.code(),
                GatewayError::Signer(_) => AUTH_ERROR_CODE,
                GatewayError::Encoding(_) => CLIENT_ERROR_CODE,
                _ => TRANSACTION_ERROR_CODE,
            },
        }
    }
}

impl From<BundlerError> for ErrorObjectOwned {
    fn from(err: BundlerError) -> Self {
        let data = match &err {
            BundlerError::SimulationFailed(reason) => Some(json!({ "reason": reason })),
            BundlerError::SimulationCall(inner) | BundlerError::Submission(inner) => {
                Some(json!({ "reason": inner.to_string() }))
            }
            _ => None,
        };
        ErrorObject::owned(err.code(), err.to_string(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_taxonomy() {
        assert_eq!(BundlerError::from(DecodeError::Malformed("eof".into())).code(), -32700);
        assert_eq!(BundlerError::from(DecodeError::MissingParams).code(), -32602);
        assert_eq!(
            BundlerError::from(ValidationError::WrongArity(2)).code(),
            -32602
        );
        assert_eq!(
            BundlerError::ChainRead(GatewayError::Provider("connection refused".into())).code(),
            -32603
        );
        assert_eq!(BundlerError::SimulationFailed("AA23".into()).code(), -32001);
        assert_eq!(
            BundlerError::Submission(GatewayError::Provider("insufficient funds".into())).code(),
            -32001
        );
        assert_eq!(
            BundlerError::Submission(GatewayError::Signer("locked".into())).code(),
            -32002
        );
        assert_eq!(
            BundlerError::Submission(GatewayError::Encoding("bad tuple".into())).code(),
            -32003
        );
    }

    #[test]
    fn expired_calls_are_internal_errors() {
        let timeout = GatewayError::Timeout {
            call: "handleOps",
            after: Duration::from_secs(10),
        };
        assert_eq!(BundlerError::Submission(timeout.clone()).code(), -32603);
        assert_eq!(BundlerError::SimulationCall(timeout).code(), -32603);
    }

    #[test]
    fn error_object_keeps_rule_text_and_chain_reason() {
        let obj = ErrorObjectOwned::from(BundlerError::from(ValidationError::EntryPointNotTrusted(
            Address::zero(),
        )));
        assert_eq!(obj.code(), -32602);
        assert!(obj.message().starts_with("entry point not trusted"));
        assert!(obj.data().is_none());

        let obj = ErrorObjectOwned::from(BundlerError::Submission(GatewayError::Provider(
            "nonce too low".into(),
        )));
        assert_eq!(obj.code(), TRANSACTION_ERROR_CODE);
        assert!(obj.data().unwrap().get().contains("nonce too low"));
    }
}
