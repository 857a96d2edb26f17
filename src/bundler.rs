// src/bundler.rs
use std::sync::Arc;

use ethers::types::{Address, H256};
use tracing::{debug, error, info, warn};

use crate::codec::DecodedRequest;
use crate::config::BundlerConfig;
use crate::error::BundlerError;
use crate::gateway::{ChainGateway, SimulationOutcome};
use crate::types::{SendUserOperationRequest, UserOperation};
use crate::validation::Validator;

/// Turns decoded `eth_sendUserOperation` requests into `handleOps` transactions.
pub struct Bundler<G> {
    config: Arc<BundlerConfig>,
    gateway: Arc<G>,
    validator: Validator,
}

impl<G: ChainGateway> Bundler<G> {
    pub fn new(config: Arc<BundlerConfig>, gateway: Arc<G>) -> Self {
        let validator = Validator::new(Arc::clone(&config));
        Self {
            config,
            gateway,
            validator,
        }
    }

    pub fn supported_entry_points(&self) -> &[Address] {
        &self.config.entry_points
    }

    /// Validates, simulates and submits one operation.
    ///
    /// Each stage runs only after the previous one succeeded and the first failure is
    /// returned as is. Nothing is retried: a caller that wants another attempt has to
    /// resend the request.
    pub async fn send_user_operation(
        &self,
        decoded: DecodedRequest,
    ) -> Result<H256, BundlerError> {
        if let Err(err) = self.validator.validate(self.gateway.as_ref(), &decoded).await {
            match &err {
                BundlerError::ChainRead(_) => warn!("Could not validate user operation: {}", err),
                _ => info!(
                    "Rejected user operation from {:?}: {}",
                    decoded.request.user_operation.sender, err
                ),
            }
            return Err(err);
        }

        let SendUserOperationRequest {
            user_operation,
            entry_point,
        } = decoded.request;
        self.simulate_and_submit(user_operation, entry_point).await
    }

    async fn simulate_and_submit(
        &self,
        op: UserOperation,
        entry_point: Address,
    ) -> Result<H256, BundlerError> {
        let sender = op.sender;

        match self
            .gateway
            .simulate_validation(entry_point, op.clone())
            .await
        {
            Ok(SimulationOutcome::Passed) => debug!("Simulation passed for {:?}", sender),
            Ok(SimulationOutcome::Failed(reason)) => {
                error!("Simulation failed for {:?}: {}", sender, reason);
                return Err(BundlerError::SimulationFailed(reason));
            }
            Err(err) => {
                error!("Simulation call failed for {:?}: {}", sender, err);
                return Err(BundlerError::SimulationCall(err));
            }
        }

        // One operation per bundle, sent once.
        let tx_hash = self
            .gateway
            .submit(entry_point, vec![op], self.config.beneficiary)
            .await
            .map_err(|err| {
                error!("Failed to submit handleOps for {:?}: {}", sender, err);
                BundlerError::Submission(err)
            })?;

        info!("Submitted user operation from {:?} in transaction {:?}", sender, tx_hash);
        Ok(tx_hash)
    }
}
