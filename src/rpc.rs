// src/rpc.rs
use std::sync::Arc;

use ethers::utils::to_checksum;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use tracing::debug;

use crate::bundler::Bundler;
use crate::codec::decode_send_params;
use crate::error::BundlerError;
use crate::gateway::ChainGateway;
use crate::types::SendUserOperationResult;

pub const SEND_USER_OPERATION: &str = "eth_sendUserOperation";
pub const SUPPORTED_ENTRY_POINTS: &str = "eth_supportedEntryPoints";

pub struct BundlerRpcImpl<G> {
    bundler: Arc<Bundler<G>>,
}

impl<G: ChainGateway> BundlerRpcImpl<G> {
    pub fn new(bundler: Arc<Bundler<G>>) -> Self {
        Self { bundler }
    }

    /// `eth_sendUserOperation`, taking the raw JSON of the `params` member.
    pub async fn send_user_operation(
        &self,
        raw_params: Option<&str>,
    ) -> Result<SendUserOperationResult, ErrorObjectOwned> {
        let decoded = decode_send_params(raw_params).map_err(|e| {
            debug!("Could not decode {} params: {}", SEND_USER_OPERATION, e);
            BundlerError::from(e)
        })?;
        debug!(
            "Received user operation from {:?} for entry point {:?}",
            decoded.request.user_operation.sender, decoded.request.entry_point
        );

        let tx_hash = self.bundler.send_user_operation(decoded).await?;
        Ok(SendUserOperationResult::submitted(tx_hash))
    }

    /// `eth_supportedEntryPoints`: the allow-list as checksummed addresses.
    pub fn supported_entry_points(&self) -> Vec<String> {
        self.bundler
            .supported_entry_points()
            .iter()
            .map(|entry_point| to_checksum(entry_point, None))
            .collect()
    }
}

pub fn register_methods<G: ChainGateway>(
    module: &mut RpcModule<BundlerRpcImpl<G>>,
) -> anyhow::Result<()> {
    module.register_async_method(SEND_USER_OPERATION, |params, context| async move {
        context.send_user_operation(params.as_str()).await
    })?;

    module.register_method(SUPPORTED_ENTRY_POINTS, |_params, context| {
        Ok::<_, ErrorObjectOwned>(context.supported_entry_points())
    })?;

    Ok(())
}
