use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use s402_core::chain::EvmChain;
use s402_core::config::Config;
use s402_core::indexer::Indexer;
use s402_core::settlement::SettlementService;
use s402_core::store::postgres::PostgresStore;
use s402_core::store::AggregateStore;
use s402_core::timestamp::SystemClock;
use s402_core::types::PaymentAuthorization;
use s402_core::util::SigDown;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "s402")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: Config,
}

#[derive(Subcommand)]
enum Command {
    /// Verifies and settles one JSON-encoded payment authorization read from stdin.
    Settle,
    /// Runs the indexer loop until interrupted.
    Index,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<std::process::ExitCode, Box<dyn std::error::Error>> {
    let config = cli.config;

    let chain = EvmChain::connect(
        &config.rpc_url,
        &config.private_key,
        config.facilitator_address,
        config.token_address,
        config.chain_id,
        config.rpc_timeout(),
        config.rpc_max_retries,
    )
    .await?;

    match cli.command {
        Command::Settle => run_settle(config, chain).await,
        Command::Index => run_index(config, chain).await,
    }
}

async fn run_settle(
    config: Config,
    chain: EvmChain,
) -> Result<std::process::ExitCode, Box<dyn std::error::Error>> {
    let mut input = String::new();
    std::io::Read::read_to_string(&mut std::io::stdin(), &mut input)?;
    let payment: PaymentAuthorization = serde_json::from_str(&input)?;

    let token_name = chain.token_name().await.unwrap_or(config.token_name.clone());
    let service = SettlementService::new(chain, &token_name, SystemClock);

    match service.settle(&payment).await {
        Ok(tx_hash) => {
            println!("{tx_hash}");
            Ok(std::process::ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(std::process::ExitCode::FAILURE)
        }
    }
}

async fn run_index(
    config: Config,
    chain: EvmChain,
) -> Result<std::process::ExitCode, Box<dyn std::error::Error>> {
    let store = PostgresStore::connect(&config.database_url, config.store_pool_max).await?;
    let store: Arc<dyn AggregateStore> = Arc::new(store);

    let sig_down = SigDown::try_new()?;
    let cancel = sig_down.cancellation_token();

    let indexer = Indexer::new(
        chain,
        store,
        SystemClock,
        config.genesis_block,
        config.batch_size,
        config.confirmations,
        Duration::from_millis(config.poll_interval_ms),
        config.token_decimals,
    );

    info!("starting indexer loop");
    indexer.start(cancel).await?;
    info!("indexer shut down cleanly");
    Ok(std::process::ExitCode::SUCCESS)
}
