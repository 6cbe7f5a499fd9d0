//! Resumable tail of the facilitator's `PaymentSettled` event log: idempotent
//! upserts into the aggregate store, daily roll-ups, reorg-safe checkpointing.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::chain::{ChainError, ChainOps, PaymentSettledLog};
use crate::store::models::{IndexedPayment, ProviderAggregate};
use crate::store::{recompute_daily_aggregate, AggregateStore, StoreError};
use crate::timestamp::{Clock, UnixTimestamp};
use crate::util::money_amount::to_usd;

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("chain unavailable: {0}")]
    Chain(#[from] ChainError),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one `sync_once` tick, surfaced to callers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub from_block: u64,
    pub to_block: u64,
    pub events_processed: usize,
    pub advanced: bool,
}

pub struct Indexer<Ch: ChainOps, C: Clock> {
    chain: Ch,
    store: Arc<dyn AggregateStore>,
    clock: C,
    genesis_block: u64,
    batch_size: u64,
    confirmations: u64,
    poll_interval: Duration,
    token_decimals: u32,
}

impl<Ch: ChainOps, C: Clock> Indexer<Ch, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Ch,
        store: Arc<dyn AggregateStore>,
        clock: C,
        genesis_block: u64,
        batch_size: u64,
        confirmations: u64,
        poll_interval: Duration,
        token_decimals: u32,
    ) -> Self {
        Self {
            chain,
            store,
            clock,
            genesis_block,
            batch_size,
            confirmations,
            poll_interval,
            token_decimals,
        }
    }

    /// Loads (or bootstraps) the checkpoint, then ticks until cancelled.
    #[instrument(skip(self, cancel))]
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), IndexerError> {
        if self.store.load_checkpoint().await?.is_none() {
            info!(genesis_block = self.genesis_block, "bootstrapping indexer checkpoint");
            self.store
                .bootstrap_checkpoint(self.genesis_block, self.clock.now())
                .await?;
        }

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.sync_once().await {
                Ok(report) => {
                    if !report.advanced {
                        tokio::select! {
                            _ = tokio::time::sleep(self.poll_interval) => {}
                            _ = cancel.cancelled() => return Ok(()),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "indexer tick failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = cancel.cancelled() => return Ok(()),
                    }
                }
            }
        }
    }

    /// Advances one window: fetch, upsert payments, refresh provider and
    /// daily aggregates, advance the checkpoint. Never advances the
    /// checkpoint past `head - confirmations`.
    #[instrument(skip(self))]
    pub async fn sync_once(&self) -> Result<SyncReport, IndexerError> {
        self.store.set_syncing(true).await?;

        let checkpoint = self
            .store
            .load_checkpoint()
            .await?
            .expect("checkpoint bootstrapped by start()");

        let head = self.chain.head_block_number().await?;
        let safe_head = head.saturating_sub(self.confirmations);

        let from_block = checkpoint.last_synced_block + 1;
        if from_block > safe_head {
            self.store.set_syncing(false).await?;
            return Ok(SyncReport {
                from_block,
                to_block: checkpoint.last_synced_block,
                events_processed: 0,
                advanced: false,
            });
        }
        let to_block = (checkpoint.last_synced_block + self.batch_size).min(safe_head);

        let events = self.chain.fetch_payment_settled(from_block, to_block).await?;

        let mut touched_dates = std::collections::BTreeSet::new();
        let mut touched_recipients = std::collections::BTreeSet::new();

        for event in &events {
            let block_timestamp = UnixTimestamp(self.chain.block_timestamp(event.block_number).await?);
            self.upsert_payment(event, block_timestamp).await?;
            touched_dates.insert(block_timestamp.utc_day());
            touched_recipients.insert(event.to);
        }

        for recipient in touched_recipients {
            self.refresh_provider_aggregate(recipient).await?;
        }

        for day in touched_dates {
            self.refresh_daily_aggregate(day).await?;
        }

        self.store.advance_checkpoint(to_block, self.clock.now()).await?;

        Ok(SyncReport {
            from_block,
            to_block,
            events_processed: events.len(),
            advanced: true,
        })
    }

    async fn upsert_payment(
        &self,
        event: &PaymentSettledLog,
        block_timestamp: UnixTimestamp,
    ) -> Result<(), IndexerError> {
        let value_usd = to_usd(event.value, self.token_decimals).unwrap_or(Decimal::ZERO);
        let fee_usd = to_usd(event.platform_fee, self.token_decimals).unwrap_or(Decimal::ZERO);
        let row = IndexedPayment {
            tx_hash: event.tx_hash.0,
            block_number: event.block_number,
            block_timestamp,
            from: event.from,
            to: event.to,
            value: event.value,
            platform_fee: event.platform_fee,
            nonce: event.nonce.0,
            value_usd,
            fee_usd,
        };
        self.store.upsert_payment(&row).await?;
        Ok(())
    }

    async fn refresh_provider_aggregate(&self, recipient: alloy_primitives::Address) -> Result<(), IndexerError> {
        let (_total_paid, total_received) = self.chain.get_stats(recipient).await?;
        let (payment_count, first_seen, last_seen) = self.store.provider_payment_stats(recipient).await?;
        let now = self.clock.now();
        let aggregate = ProviderAggregate {
            address: recipient,
            total_received,
            payment_count,
            first_seen: first_seen.unwrap_or(now),
            last_seen: last_seen.unwrap_or(now),
        };
        self.store.upsert_provider_aggregate(&aggregate).await?;
        Ok(())
    }

    async fn refresh_daily_aggregate(&self, utc_day: i64) -> Result<(), IndexerError> {
        let date = chrono::DateTime::from_timestamp(utc_day * 86_400, 0)
            .expect("utc_day produces a representable timestamp")
            .date_naive();
        let payments = self.store.payments_for_date(date).await?;
        let aggregate = recompute_daily_aggregate(date, &payments);
        self.store.upsert_daily_aggregate(&aggregate).await?;
        Ok(())
    }
}
