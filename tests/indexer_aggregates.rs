use alloy_primitives::{address, B256, U256};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use s402_core::store::models::IndexedPayment;
use s402_core::store::recompute_daily_aggregate;
use s402_core::timestamp::UnixTimestamp;
use std::str::FromStr;

fn payment(from_suffix: u8, to_suffix: u8, value_usd: &str, fee_usd: &str) -> IndexedPayment {
    IndexedPayment {
        tx_hash: B256::repeat_byte(from_suffix),
        block_number: 100,
        block_timestamp: UnixTimestamp(1_700_000_000),
        from: address!("0x0000000000000000000000000000000000000001").with_last_byte(from_suffix),
        to: address!("0x0000000000000000000000000000000000000002").with_last_byte(to_suffix),
        value: U256::from(1u64),
        platform_fee: U256::ZERO,
        nonce: B256::ZERO,
        value_usd: Decimal::from_str(value_usd).unwrap(),
        fee_usd: Decimal::from_str(fee_usd).unwrap(),
    }
}

trait WithLastByte {
    fn with_last_byte(self, byte: u8) -> Self;
}

impl WithLastByte for alloy_primitives::Address {
    fn with_last_byte(self, byte: u8) -> Self {
        let mut bytes = self.into_array();
        bytes[19] = byte;
        alloy_primitives::Address::from(bytes)
    }
}

#[test]
fn daily_rollup_sums_volume_and_fees_across_all_touched_payments() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let payments = vec![
        payment(1, 9, "10.00", "0.10"),
        payment(2, 9, "20.00", "0.20"),
        payment(3, 9, "5.00", "0.05"),
    ];
    let aggregate = recompute_daily_aggregate(date, &payments);

    assert_eq!(aggregate.count, 3);
    assert_eq!(aggregate.volume_usd, Decimal::from_str("35.00").unwrap());
    assert_eq!(aggregate.fees_usd, Decimal::from_str("0.35").unwrap());
    assert_eq!(aggregate.unique_payers, 3);
    assert_eq!(aggregate.unique_providers, 1);
}

#[test]
fn daily_rollup_on_an_empty_window_is_all_zero() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let aggregate = recompute_daily_aggregate(date, &[]);

    assert_eq!(aggregate.count, 0);
    assert_eq!(aggregate.volume_usd, Decimal::ZERO);
    assert_eq!(aggregate.avg_payment_usd, Decimal::ZERO);
}

#[test]
fn running_the_rollup_twice_on_the_same_payments_is_idempotent() {
    let date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
    let payments = vec![payment(1, 9, "1.00", "0.01")];

    let first = recompute_daily_aggregate(date, &payments);
    let second = recompute_daily_aggregate(date, &payments);
    assert_eq!(first, second);
}
