//! Postgres-backed `AggregateStore`, using runtime-checked queries since no
//! live database is available at build time to validate `query!` macros against.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

use crate::store::models::{DailyAggregate, IndexedPayment, IndexerCheckpoint, ProviderAggregate};
use crate::store::{AggregateStore, Inserted, StoreError};
use crate::timestamp::UnixTimestamp;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Unavailable(e.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, pool_max: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_max)
            .idle_timeout(Duration::from_secs(30))
            .acquire_timeout(Duration::from_secs(2))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_address(raw: &str) -> Result<Address, StoreError> {
    Address::from_str(raw).map_err(|e| StoreError::Query(format!("bad address in row: {e}")))
}

fn parse_b256(raw: &str) -> Result<B256, StoreError> {
    B256::from_str(raw).map_err(|e| StoreError::Query(format!("bad hash in row: {e}")))
}

fn parse_u256(raw: &str) -> Result<U256, StoreError> {
    U256::from_str(raw).map_err(|e| StoreError::Query(format!("bad integer in row: {e}")))
}

#[async_trait]
impl AggregateStore for PostgresStore {
    async fn load_checkpoint(&self) -> Result<Option<IndexerCheckpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT last_synced_block, last_synced_at, is_syncing FROM indexer_checkpoint WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| IndexerCheckpoint {
            last_synced_block: r.get::<i64, _>("last_synced_block") as u64,
            last_synced_at: UnixTimestamp(r.get::<i64, _>("last_synced_at") as u64),
            is_syncing: r.get("is_syncing"),
        }))
    }

    async fn bootstrap_checkpoint(
        &self,
        genesis_block: u64,
        now: UnixTimestamp,
    ) -> Result<IndexerCheckpoint, StoreError> {
        sqlx::query(
            "INSERT INTO indexer_checkpoint (id, last_synced_block, last_synced_at, is_syncing)
             VALUES (1, $1, $2, false)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(genesis_block as i64)
        .bind(now.seconds_since_epoch() as i64)
        .execute(&self.pool)
        .await?;
        self.load_checkpoint().await?.ok_or_else(|| {
            StoreError::Query("checkpoint row missing immediately after bootstrap".to_string())
        })
    }

    async fn set_syncing(&self, syncing: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE indexer_checkpoint SET is_syncing = $1 WHERE id = 1")
            .bind(syncing)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn advance_checkpoint(
        &self,
        last_synced_block: u64,
        now: UnixTimestamp,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE indexer_checkpoint
             SET last_synced_block = $1, last_synced_at = $2, is_syncing = false
             WHERE id = 1",
        )
        .bind(last_synced_block as i64)
        .bind(now.seconds_since_epoch() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_payment(&self, payment: &IndexedPayment) -> Result<Inserted, StoreError> {
        let result = sqlx::query(
            "INSERT INTO indexed_payment
                (tx_hash, block_number, block_timestamp, from_address, to_address,
                 value, platform_fee, nonce, value_usd, fee_usd)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (tx_hash) DO NOTHING",
        )
        .bind(payment.tx_hash.to_string())
        .bind(payment.block_number as i64)
        .bind(payment.block_timestamp.seconds_since_epoch() as i64)
        .bind(payment.from.to_string())
        .bind(payment.to.to_string())
        .bind(payment.value.to_string())
        .bind(payment.platform_fee.to_string())
        .bind(payment.nonce.to_string())
        .bind(payment.value_usd)
        .bind(payment.fee_usd)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_provider_aggregate(
        &self,
        aggregate: &ProviderAggregate,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO provider_aggregate
                (address, total_received, payment_count, first_seen, last_seen)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (address) DO UPDATE SET
                total_received = EXCLUDED.total_received,
                payment_count = EXCLUDED.payment_count,
                first_seen = LEAST(provider_aggregate.first_seen, EXCLUDED.first_seen),
                last_seen = GREATEST(provider_aggregate.last_seen, EXCLUDED.last_seen)",
        )
        .bind(aggregate.address.to_string())
        .bind(aggregate.total_received.to_string())
        .bind(aggregate.payment_count)
        .bind(aggregate.first_seen.seconds_since_epoch() as i64)
        .bind(aggregate.last_seen.seconds_since_epoch() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn payments_for_date(&self, date: NaiveDate) -> Result<Vec<IndexedPayment>, StoreError> {
        let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end = start + 86_400;
        let rows = sqlx::query(
            "SELECT tx_hash, block_number, block_timestamp, from_address, to_address,
                    value, platform_fee, nonce, value_usd, fee_usd
             FROM indexed_payment
             WHERE block_timestamp >= $1 AND block_timestamp < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(IndexedPayment {
                    tx_hash: parse_b256(r.get::<String, _>("tx_hash").as_str())?,
                    block_number: r.get::<i64, _>("block_number") as u64,
                    block_timestamp: UnixTimestamp(r.get::<i64, _>("block_timestamp") as u64),
                    from: parse_address(r.get::<String, _>("from_address").as_str())?,
                    to: parse_address(r.get::<String, _>("to_address").as_str())?,
                    value: parse_u256(r.get::<String, _>("value").as_str())?,
                    platform_fee: parse_u256(r.get::<String, _>("platform_fee").as_str())?,
                    nonce: parse_b256(r.get::<String, _>("nonce").as_str())?,
                    value_usd: r.get::<Decimal, _>("value_usd"),
                    fee_usd: r.get::<Decimal, _>("fee_usd"),
                })
            })
            .collect()
    }

    async fn provider_payment_stats(
        &self,
        recipient: Address,
    ) -> Result<(i64, Option<UnixTimestamp>, Option<UnixTimestamp>), StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count, MIN(block_timestamp) AS first_seen, MAX(block_timestamp) AS last_seen
             FROM indexed_payment WHERE to_address = $1",
        )
        .bind(recipient.to_string())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("count");
        let first_seen: Option<i64> = row.get("first_seen");
        let last_seen: Option<i64> = row.get("last_seen");
        Ok((
            count,
            first_seen.map(|t| UnixTimestamp(t as u64)),
            last_seen.map(|t| UnixTimestamp(t as u64)),
        ))
    }

    async fn upsert_daily_aggregate(&self, aggregate: &DailyAggregate) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO daily_aggregate
                (date, count, volume_usd, fees_usd, unique_payers, unique_providers, avg_payment_usd)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (date) DO UPDATE SET
                count = EXCLUDED.count,
                volume_usd = EXCLUDED.volume_usd,
                fees_usd = EXCLUDED.fees_usd,
                unique_payers = EXCLUDED.unique_payers,
                unique_providers = EXCLUDED.unique_providers,
                avg_payment_usd = EXCLUDED.avg_payment_usd",
        )
        .bind(aggregate.date)
        .bind(aggregate.count)
        .bind(aggregate.volume_usd)
        .bind(aggregate.fees_usd)
        .bind(aggregate.unique_payers)
        .bind(aggregate.unique_providers)
        .bind(aggregate.avg_payment_usd)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
