//! Process-wide configuration, constructed once at startup and threaded
//! through both services explicitly; no global state beyond this struct.

use alloy_primitives::Address;
use clap::Parser;
use std::time::Duration;
use url::Url;

#[derive(Debug, Parser, Clone)]
#[command(name = "s402", about = "S402 settlement and indexing core")]
pub struct Config {
    /// Chain RPC endpoint used for event fetch and transaction submission.
    #[arg(long, env = "S402_RPC_URL")]
    pub rpc_url: Url,

    /// Private key used to sign submitted settlement transactions.
    #[arg(long, env = "S402_PRIVATE_KEY")]
    pub private_key: String,

    /// Chain id the RPC endpoint is expected to serve.
    #[arg(long, env = "S402_CHAIN_ID")]
    pub chain_id: u64,

    /// Facilitator contract: event source and submission target.
    #[arg(long, env = "S402_FACILITATOR_ADDRESS")]
    pub facilitator_address: Address,

    /// Payment token contract, used for permit signature recovery.
    #[arg(long, env = "S402_TOKEN_ADDRESS")]
    pub token_address: Address,

    /// Token decimals, used to convert raw integer amounts to `*_usd` fields.
    #[arg(long, env = "S402_TOKEN_DECIMALS", default_value_t = 6)]
    pub token_decimals: u32,

    /// Token name used in its EIP-712 permit domain (e.g. `"USD Coin"`).
    #[arg(long, env = "S402_TOKEN_NAME")]
    pub token_name: String,

    /// Bootstrap checkpoint value when no checkpoint row exists yet.
    #[arg(long, env = "S402_GENESIS_BLOCK")]
    pub genesis_block: u64,

    /// Blocks scanned per indexer tick.
    #[arg(long, env = "S402_BATCH_SIZE", default_value_t = 500)]
    pub batch_size: u64,

    /// Sleep between indexer ticks, in milliseconds.
    #[arg(long, env = "S402_POLL_INTERVAL_MS", default_value_t = 60_000)]
    pub poll_interval_ms: u64,

    /// Block lag maintained below the chain head before a block is considered safe.
    #[arg(long, env = "S402_CONFIRMATIONS", default_value_t = 12)]
    pub confirmations: u64,

    /// Per-RPC-call timeout, in milliseconds.
    #[arg(long, env = "S402_RPC_TIMEOUT_MS", default_value_t = 10_000)]
    pub rpc_timeout_ms: u64,

    /// Maximum backoff retries for a single RPC call before the error propagates.
    #[arg(long, env = "S402_RPC_MAX_RETRIES", default_value_t = 5)]
    pub rpc_max_retries: u32,

    /// Postgres connection string for the aggregate store.
    #[arg(long, env = "S402_DATABASE_URL")]
    pub database_url: String,

    /// Maximum concurrent connections in the store's pool.
    #[arg(long, env = "S402_STORE_POOL_MAX", default_value_t = 10)]
    pub store_pool_max: u32,
}

impl Config {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_and_default_fields() {
        let cfg = Config::parse_from([
            "s402",
            "--rpc-url",
            "https://example.invalid/rpc",
            "--private-key",
            "0x0000000000000000000000000000000000000000000000000000000000000001",
            "--chain-id",
            "8453",
            "--facilitator-address",
            "0x0000000000000000000000000000000000000001",
            "--token-address",
            "0x0000000000000000000000000000000000000002",
            "--token-name",
            "USD Coin",
            "--genesis-block",
            "1000",
            "--database-url",
            "postgres://localhost/s402",
        ]);
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.confirmations, 12);
        assert_eq!(cfg.poll_interval_ms, 60_000);
        assert_eq!(cfg.token_decimals, 6);
    }
}
