//! Row types for the aggregate store.

use alloy_primitives::{Address, B256, U256};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::timestamp::UnixTimestamp;

/// One settled payment, keyed by transaction hash.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPayment {
    pub tx_hash: B256,
    pub block_number: u64,
    pub block_timestamp: UnixTimestamp,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub platform_fee: U256,
    pub nonce: B256,
    pub value_usd: Decimal,
    pub fee_usd: Decimal,
}

/// Recipient-side running totals, refreshed from the chain's authoritative
/// `getStats` view rather than summed incrementally.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderAggregate {
    pub address: Address,
    pub total_received: U256,
    pub payment_count: i64,
    pub first_seen: UnixTimestamp,
    pub last_seen: UnixTimestamp,
}

/// One calendar day (UTC) of settlement activity.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub count: i64,
    pub volume_usd: Decimal,
    pub fees_usd: Decimal,
    pub unique_payers: i64,
    pub unique_providers: i64,
    pub avg_payment_usd: Decimal,
}

/// The singleton indexer progress row.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerCheckpoint {
    pub last_synced_block: u64,
    pub last_synced_at: UnixTimestamp,
    pub is_syncing: bool,
}
