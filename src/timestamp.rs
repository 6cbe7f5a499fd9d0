//! Unix-second timestamp type shared by payment deadlines and block headers.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

/// A Unix timestamp represented as a `u64`.
///
/// Used for `PaymentAuthorization::deadline` and `IndexedPayment::block_timestamp`.
/// Serialized as a stringified integer to avoid precision loss in JSON.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(pub u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl From<UnixTimestamp> for U256 {
    fn from(value: UnixTimestamp) -> Self {
        U256::from(value.0)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

impl Sub<u64> for UnixTimestamp {
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_sub(rhs))
    }
}

impl UnixTimestamp {
    pub fn seconds_since_epoch(&self) -> u64 {
        self.0
    }

    /// Calendar date this timestamp falls on, bucketed by UTC day (`floor(ts / 86400)`).
    pub fn utc_day(&self) -> i64 {
        (self.0 / 86_400) as i64
    }
}

/// A source of the current time, injected rather than read from `SystemTime::now()` directly.
///
/// Lets deadline checks and daily-rollup bucketing be driven deterministically in tests,
/// per the "implicit time sources" design note.
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixTimestamp;
}

/// The real wall clock, backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixTimestamp {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        UnixTimestamp(secs)
    }
}

/// A fixed clock for tests: always reports the same instant unless advanced.
#[derive(Debug, Clone, Default)]
pub struct FixedClock(std::sync::atomic::AtomicU64);

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(now))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> UnixTimestamp {
        UnixTimestamp(self.0.load(std::sync::atomic::Ordering::SeqCst))
    }
}
