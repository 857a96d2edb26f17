// src/validation.rs
use std::sync::Arc;

use ethers::types::{Address, U256};

use crate::codec::DecodedRequest;
use crate::config::BundlerConfig;
use crate::error::{BundlerError, ValidationError};
use crate::gateway::ChainGateway;
use crate::types::UserOperation;

/// Evaluates the admission rules in a fixed order and stops at the first violation.
///
/// Chain state is read lazily, right before the rule that needs it, so a request that
/// fails an earlier rule never causes the later reads.
pub struct Validator {
    config: Arc<BundlerConfig>,
}

impl Validator {
    pub fn new(config: Arc<BundlerConfig>) -> Self {
        Self { config }
    }

    pub async fn validate<G>(
        &self,
        gateway: &G,
        decoded: &DecodedRequest,
    ) -> Result<(), BundlerError>
    where
        G: ChainGateway + ?Sized,
    {
        let op = &decoded.request.user_operation;

        check_entry_point(&self.config, decoded.request.entry_point)?;
        check_arity(decoded.param_count)?;

        let sender_code = gateway
            .code_at(op.sender)
            .await
            .map_err(BundlerError::ChainRead)?;
        check_sender_or_init_code(op, !sender_code.is_empty())?;

        check_verification_gas(op, self.config.max_verification_gas)?;
        check_pre_verification_gas(op)?;

        let paymaster = op
            .paymaster()
            .ok_or(ValidationError::PaymasterTooShort(op.paymaster_and_data.len()))?;
        if !paymaster.is_zero() {
            let paymaster_code = gateway
                .code_at(paymaster)
                .await
                .map_err(BundlerError::ChainRead)?;
            check_paymaster(paymaster, !paymaster_code.is_empty())?;
        }

        let base_fee = gateway
            .current_base_fee()
            .await
            .map_err(BundlerError::ChainRead)?;
        check_max_fee(op, base_fee)?;
        check_priority_fee(op, self.config.min_priority_fee_per_gas)?;

        Ok(())
    }
}

fn check_entry_point(
    config: &BundlerConfig,
    entry_point: Address,
) -> Result<(), ValidationError> {
    if !config.is_trusted_entry_point(&entry_point) {
        return Err(ValidationError::EntryPointNotTrusted(entry_point));
    }
    Ok(())
}

fn check_arity(param_count: usize) -> Result<(), ValidationError> {
    if param_count != 1 {
        return Err(ValidationError::WrongArity(param_count));
    }
    Ok(())
}

fn check_sender_or_init_code(
    op: &UserOperation,
    sender_has_code: bool,
) -> Result<(), ValidationError> {
    match (sender_has_code, op.init_code.is_empty()) {
        (false, true) => Err(ValidationError::SenderNotDeployedWithoutInitCode(op.sender)),
        (true, false) => Err(ValidationError::ExistingSenderWithInitCode(op.sender)),
        _ => Ok(()),
    }
}

fn check_verification_gas(
    op: &UserOperation,
    max_verification_gas: U256,
) -> Result<(), ValidationError> {
    if op.verification_gas_limit > max_verification_gas {
        return Err(ValidationError::VerificationGasTooHigh(
            op.verification_gas_limit,
            max_verification_gas,
        ));
    }
    Ok(())
}

fn check_pre_verification_gas(op: &UserOperation) -> Result<(), ValidationError> {
    let min_pre_verification_gas = op
        .call_gas_limit
        .checked_add(op.verification_gas_limit)
        .ok_or(ValidationError::GasLimitsOverflow(
            op.call_gas_limit,
            op.verification_gas_limit,
        ))?;
    if op.pre_verification_gas < min_pre_verification_gas {
        return Err(ValidationError::PreVerificationGasTooLow(
            op.pre_verification_gas,
            min_pre_verification_gas,
        ));
    }
    Ok(())
}

/// Only called for a nonzero paymaster; the zero address means self-sponsored.
fn check_paymaster(paymaster: Address, paymaster_has_code: bool) -> Result<(), ValidationError> {
    if !paymaster_has_code {
        return Err(ValidationError::PaymasterNotDeployed(paymaster));
    }
    Ok(())
}

fn check_max_fee(op: &UserOperation, base_fee: U256) -> Result<(), ValidationError> {
    if op.max_fee_per_gas <= base_fee {
        return Err(ValidationError::MaxFeeTooLow(op.max_fee_per_gas, base_fee));
    }
    Ok(())
}

fn check_priority_fee(
    op: &UserOperation,
    min_priority_fee_per_gas: U256,
) -> Result<(), ValidationError> {
    if op.max_priority_fee_per_gas <= min_priority_fee_per_gas {
        return Err(ValidationError::PriorityFeeTooLow(
            op.max_priority_fee_per_gas,
            min_priority_fee_per_gas,
        ));
    }
    Ok(())
}
