// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256};
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::RpcModule;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod bundler;
mod codec;
mod config;
mod contracts;
mod error;
mod gateway;
mod rpc;
#[cfg(test)]
mod test_utils;
mod types;
mod validation;

use crate::bundler::Bundler;
use crate::config::{parse_u256, BundlerConfig, RetryPolicy, DEFAULT_ENTRY_POINT};
use crate::gateway::{ChainGateway, EthersGateway};
use crate::rpc::BundlerRpcImpl;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "RPC_SERVER_ADDR", default_value = "0.0.0.0:8080")]
    rpc_server_addr: String,

    #[clap(short, long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    #[clap(short, long, env = "CHAIN_ID")]
    chain_id: u64,

    #[clap(short, long, env = "ETH_RPC_URL")]
    eth_rpc_url: String,

    /// Trusted entry points, comma separated
    #[clap(
        long,
        env = "ENTRY_POINTS",
        value_delimiter = ',',
        default_value = DEFAULT_ENTRY_POINT
    )]
    entry_points: Vec<Address>,

    /// Fee recipient of submitted bundles, defaults to the signer
    #[clap(long, env = "BENEFICIARY")]
    beneficiary: Option<Address>,

    #[clap(
        long,
        env = "MAX_VERIFICATION_GAS",
        default_value = "100000000000",
        value_parser = parse_u256
    )]
    max_verification_gas: U256,

    #[clap(
        long,
        env = "MIN_PRIORITY_FEE_PER_GAS",
        default_value = "1000000000",
        value_parser = parse_u256
    )]
    min_priority_fee_per_gas: U256,

    #[clap(long, env = "CHAIN_CALL_TIMEOUT_MS", default_value_t = 10_000)]
    chain_call_timeout_ms: u64,

    /// Attempts per chain read before giving up
    #[clap(long, env = "READ_RETRIES", default_value_t = 3)]
    read_retries: u32,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // The signing wallet pays for every handleOps transaction
    let wallet = args
        .private_key
        .parse::<LocalWallet>()?
        .with_chain_id(args.chain_id);
    let beneficiary = args.beneficiary.unwrap_or_else(|| wallet.address());
    info!(
        "Submitting bundles from {:?} with beneficiary {:?}",
        wallet.address(),
        beneficiary
    );

    let config = Arc::new(BundlerConfig {
        entry_points: args.entry_points,
        beneficiary,
        max_verification_gas: args.max_verification_gas,
        min_priority_fee_per_gas: args.min_priority_fee_per_gas,
        chain_call_timeout: Duration::from_millis(args.chain_call_timeout_ms),
        read_retry: RetryPolicy {
            max_attempts: args.read_retries.max(1),
            ..RetryPolicy::default()
        },
    });
    info!("Trusted entry points: {:?}", config.entry_points);

    let gateway = EthersGateway::new(
        &args.eth_rpc_url,
        wallet,
        config.chain_call_timeout,
        config.read_retry,
    )?;
    let bundler = Bundler::new(config, Arc::new(gateway));

    // Create the JSON-RPC server
    let server_addr: SocketAddr = args.rpc_server_addr.parse()?;
    let bundler_rpc = BundlerRpcImpl::new(Arc::new(bundler));

    info!("Starting ERC-4337 bundler RPC server on {}", server_addr);

    let server_handle = start_server(server_addr, bundler_rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server<G: ChainGateway>(
    server_addr: SocketAddr,
    bundler_rpc: BundlerRpcImpl<G>,
) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;

    let mut module = RpcModule::new(bundler_rpc);
    rpc::register_methods(&mut module)?;
    let server_handle = server.start(module);

    Ok(server_handle)
}
