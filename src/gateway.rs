// src/gateway.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{self, AbiDecode, ParamType, Token};
use ethers::contract::ContractError;
use ethers::middleware::signer::SignerMiddlewareError;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::LocalWallet;
use ethers::types::{Address, BlockNumber, Bytes, H256, U256};
use ethers::utils::id;
#[cfg(test)]
use mockall::automock;
use tokio::time;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::contracts::{
    FailedOp, IEntryPoint, VALIDATION_RESULT_SIGNATURE,
    VALIDATION_RESULT_WITH_AGGREGATION_SIGNATURE,
};
use crate::error::GatewayError;
use crate::types::UserOperation;

/// EIP-1559 `BASE_FEE_MAX_CHANGE_DENOMINATOR`.
const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
/// EIP-1559 `ELASTICITY_MULTIPLIER`.
const ELASTICITY_MULTIPLIER: u64 = 2;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Passed,
    Failed(String),
}

/// The chain capabilities the admission pipeline depends on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync + 'static {
    /// Deployed code at `address`, empty for externally owned or undeployed accounts.
    async fn code_at(&self, address: Address) -> Result<Bytes, GatewayError>;

    /// Base fee of the block the next transaction would land in.
    async fn current_base_fee(&self) -> Result<U256, GatewayError>;

    /// Dry-runs `simulateValidation` on `entry_point` without changing state.
    async fn simulate_validation(
        &self,
        entry_point: Address,
        op: UserOperation,
    ) -> Result<SimulationOutcome, GatewayError>;

    /// Sends `handleOps(ops, beneficiary)` and returns the transaction hash.
    async fn submit(
        &self,
        entry_point: Address,
        ops: Vec<UserOperation>,
        beneficiary: Address,
    ) -> Result<H256, GatewayError>;
}

/// [`ChainGateway`] backed by an HTTP provider and a local signing key.
pub struct EthersGateway {
    client: Arc<SignerClient>,
    timeout: Duration,
    read_retry: RetryPolicy,
}

impl EthersGateway {
    pub fn new(
        eth_rpc_url: &str,
        wallet: LocalWallet,
        timeout: Duration,
        read_retry: RetryPolicy,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(eth_rpc_url)?;
        let client = Arc::new(SignerMiddleware::new(provider, wallet));

        Ok(Self {
            client,
            timeout,
            read_retry,
        })
    }

    async fn load_next_base_fee(&self) -> Result<U256, GatewayError> {
        let block = self
            .client
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?
            .ok_or(GatewayError::BlockUnavailable("node returned no block"))?;
        let base_fee = block
            .base_fee_per_gas
            .ok_or(GatewayError::BlockUnavailable("no baseFeePerGas"))?;

        Ok(calc_next_base_fee(base_fee, block.gas_used, block.gas_limit))
    }
}

#[async_trait]
impl ChainGateway for EthersGateway {
    async fn code_at(&self, address: Address) -> Result<Bytes, GatewayError> {
        with_retries(
            "load account code",
            || {
                with_deadline("eth_getCode", self.timeout, async move {
                    self.client
                        .get_code(address, None)
                        .await
                        .map_err(|e| GatewayError::Provider(e.to_string()))
                })
            },
            self.read_retry,
        )
        .await
    }

    async fn current_base_fee(&self) -> Result<U256, GatewayError> {
        with_retries(
            "load base fee",
            || with_deadline("eth_getBlockByNumber", self.timeout, self.load_next_base_fee()),
            self.read_retry,
        )
        .await
    }

    async fn simulate_validation(
        &self,
        entry_point: Address,
        op: UserOperation,
    ) -> Result<SimulationOutcome, GatewayError> {
        let entry_point = IEntryPoint::new(entry_point, Arc::clone(&self.client));
        let call = entry_point.simulate_validation(op.into());

        with_deadline("simulateValidation", self.timeout, async move {
            let err = match call.call().await {
                Ok(()) => {
                    return Err(GatewayError::Contract(
                        "simulateValidation returned without reverting".to_string(),
                    ))
                }
                Err(err) => err,
            };
            if let Some(revert_data) = err.as_revert() {
                return Ok(decode_simulation_revert(revert_data));
            }
            Err(contract_error(err))
        })
        .await
    }

    async fn submit(
        &self,
        entry_point: Address,
        ops: Vec<UserOperation>,
        beneficiary: Address,
    ) -> Result<H256, GatewayError> {
        debug!(
            "Sending handleOps with {} operation(s) to {:?}",
            ops.len(),
            entry_point
        );
        let entry_point = IEntryPoint::new(entry_point, Arc::clone(&self.client));
        let call = entry_point.handle_ops(ops.into_iter().map(Into::into).collect(), beneficiary);

        with_deadline("handleOps", self.timeout, async move {
            let pending = call.send().await.map_err(contract_error)?;
            Ok(pending.tx_hash())
        })
        .await
    }
}

fn contract_error(err: ContractError<SignerClient>) -> GatewayError {
    if let Some(revert_data) = err.as_revert() {
        return GatewayError::Contract(format!("execution reverted: {revert_data}"));
    }
    match err {
        ContractError::AbiError(e) => GatewayError::Encoding(e.to_string()),
        ContractError::MiddlewareError {
            e: SignerMiddlewareError::SignerError(e),
        } => GatewayError::Signer(e.to_string()),
        ContractError::MiddlewareError { e } => GatewayError::Provider(e.to_string()),
        ContractError::ProviderError { e } => GatewayError::Provider(e.to_string()),
        other => GatewayError::Contract(other.to_string()),
    }
}

/// Interprets the revert data of EntryPoint v0.6 `simulateValidation`, which never
/// returns normally.
pub fn decode_simulation_revert(data: &[u8]) -> SimulationOutcome {
    if data.len() >= 4 {
        let payload = &data[4..];
        if data[..4] == id(VALIDATION_RESULT_SIGNATURE) {
            return validation_result_outcome(payload, false);
        }
        if data[..4] == id(VALIDATION_RESULT_WITH_AGGREGATION_SIGNATURE) {
            return validation_result_outcome(payload, true);
        }
    }
    if let Ok(failed_op) = FailedOp::decode(data) {
        return SimulationOutcome::Failed(failed_op.reason);
    }
    SimulationOutcome::Failed(format!("unrecognized revert data 0x{}", hex::encode(data)))
}

fn validation_result_outcome(payload: &[u8], aggregated: bool) -> SimulationOutcome {
    let stake_info = ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Uint(256)]);
    let return_info = ParamType::Tuple(vec![
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Bool,
        ParamType::Uint(48),
        ParamType::Uint(48),
        ParamType::Bytes,
    ]);
    let mut types = vec![
        return_info,
        stake_info.clone(),
        stake_info.clone(),
        stake_info.clone(),
    ];
    if aggregated {
        types.push(ParamType::Tuple(vec![ParamType::Address, stake_info]));
    }

    let tokens = match abi::decode(&types, payload) {
        Ok(tokens) => tokens,
        Err(e) => return SimulationOutcome::Failed(format!("malformed ValidationResult: {e}")),
    };
    // returnInfo.sigFailed
    match tokens.first() {
        Some(Token::Tuple(return_info)) => match return_info.get(2) {
            Some(Token::Bool(true)) => {
                SimulationOutcome::Failed("signature validation failed".to_string())
            }
            _ => SimulationOutcome::Passed,
        },
        _ => SimulationOutcome::Failed("malformed ValidationResult".to_string()),
    }
}

/// EIP-1559 base fee of the child of a block with the given base fee and gas usage.
pub fn calc_next_base_fee(parent_base_fee: U256, gas_used: U256, gas_limit: U256) -> U256 {
    let gas_target = gas_limit / ELASTICITY_MULTIPLIER;
    if gas_target.is_zero() || gas_used == gas_target {
        return parent_base_fee;
    }

    if gas_used > gas_target {
        let delta = parent_base_fee * (gas_used - gas_target)
            / gas_target
            / BASE_FEE_CHANGE_DENOMINATOR;
        parent_base_fee + delta.max(U256::one())
    } else {
        let delta = parent_base_fee * (gas_target - gas_used)
            / gas_target
            / BASE_FEE_CHANGE_DENOMINATOR;
        parent_base_fee.saturating_sub(delta)
    }
}

/// Fails with [`GatewayError::Timeout`] when `fut` does not finish within `after`.
pub async fn with_deadline<T, F>(
    call: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    time::timeout(after, fut)
        .await
        .map_err(|_| GatewayError::Timeout { call, after })?
}

/// Runs `func` until it succeeds or `policy.max_attempts` attempts have failed.
pub async fn with_retries<Func, Fut, Out>(
    description: &str,
    func: Func,
    policy: RetryPolicy,
) -> Result<Out, GatewayError>
where
    Func: Fn() -> Fut,
    Fut: Future<Output = Result<Out, GatewayError>>,
{
    let mut next_wait = policy.min_wait;
    let mut attempt = 1;
    loop {
        match func().await {
            Ok(out) => return Ok(out),
            Err(error) if attempt >= policy.max_attempts => return Err(error),
            Err(error) => warn!("Failed to {description} (attempt {attempt}): {error}"),
        }
        time::sleep(next_wait).await;
        next_wait = (next_wait * 2).min(policy.max_wait);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    const GWEI: u64 = 1_000_000_000;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(2),
        }
    }

    fn validation_result(sig_failed: bool) -> Vec<u8> {
        let stake_info = Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::zero())]);
        let mut data = id(VALIDATION_RESULT_SIGNATURE).to_vec();
        data.extend(abi::encode(&[
            Token::Tuple(vec![
                Token::Uint(U256::from(45_000)),
                Token::Uint(U256::from(GWEI)),
                Token::Bool(sig_failed),
                Token::Uint(U256::zero()),
                Token::Uint(U256::from(u32::MAX)),
                Token::Bytes(vec![]),
            ]),
            stake_info.clone(),
            stake_info.clone(),
            stake_info,
        ]));
        data
    }

    #[test]
    fn base_fee_unchanged_at_target() {
        let next = calc_next_base_fee(GWEI.into(), 15_000_000.into(), 30_000_000.into());
        assert_eq!(next, U256::from(GWEI));
    }

    #[test]
    fn base_fee_moves_by_an_eighth_at_the_extremes() {
        let full = calc_next_base_fee(GWEI.into(), 30_000_000.into(), 30_000_000.into());
        assert_eq!(full, U256::from(1_125_000_000u64));

        let empty = calc_next_base_fee(GWEI.into(), U256::zero(), 30_000_000.into());
        assert_eq!(empty, U256::from(875_000_000u64));
    }

    #[test]
    fn base_fee_increases_by_at_least_one_wei() {
        let next = calc_next_base_fee(7.into(), 30_000_000.into(), 30_000_000.into());
        assert_eq!(next, U256::from(8));
    }

    #[test]
    fn base_fee_without_gas_limit_is_kept() {
        assert_eq!(
            calc_next_base_fee(GWEI.into(), U256::zero(), U256::zero()),
            U256::from(GWEI)
        );
    }

    #[test]
    fn validation_result_passes() {
        assert_eq!(
            decode_simulation_revert(&validation_result(false)),
            SimulationOutcome::Passed
        );
    }

    #[test]
    fn failed_signature_fails_simulation() {
        assert_eq!(
            decode_simulation_revert(&validation_result(true)),
            SimulationOutcome::Failed("signature validation failed".to_string())
        );
    }

    #[test]
    fn failed_op_reason_is_reported() {
        let mut data = id("FailedOp(uint256,string)").to_vec();
        data.extend(abi::encode(&[
            Token::Uint(U256::zero()),
            Token::String("AA21 didn't pay prefund".to_string()),
        ]));
        assert_eq!(
            decode_simulation_revert(&data),
            SimulationOutcome::Failed("AA21 didn't pay prefund".to_string())
        );
    }

    #[test]
    fn unknown_revert_fails_simulation() {
        assert!(matches!(
            decode_simulation_revert(&[0xde, 0xad]),
            SimulationOutcome::Failed(reason) if reason.contains("0xdead")
        ));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let result = with_retries(
            "load account code",
            || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::Provider("connection reset".to_string()))
                } else {
                    Ok(Bytes::from(vec![0x60]))
                }
            },
            fast_retry(3),
        )
        .await;
        assert_eq!(result, Ok(Bytes::from(vec![0x60])));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let result: Result<(), _> = with_retries(
            "load base fee",
            || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Provider("connection reset".to_string()))
            },
            fast_retry(2),
        )
        .await;
        assert_eq!(
            result,
            Err(GatewayError::Provider("connection reset".to_string()))
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        let after = Duration::from_millis(10);
        let result: Result<(), _> = with_deadline("eth_getCode", after, async {
            time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result,
            Err(GatewayError::Timeout {
                call: "eth_getCode",
                after
            })
        );
    }
}
