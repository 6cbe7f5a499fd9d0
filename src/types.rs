//! Wire types for payment authorizations submitted to the Settlement Service.
//!
//! A client submits one of these (as JSON) and the service verifies two
//! EIP-712 signatures over it before forwarding a transaction to the
//! on-chain facilitator.

use alloy_primitives::{Address, B256, U256};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

/// A 65-byte ECDSA signature (r, s, v) from an EIP-712 signing operation.
///
/// Serialized as a `0x`-prefixed, 130-hex-character string, matching the wire
/// format clients use for `permit_signature` / `auth_signature`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EvmSignature(pub [u8; 65]);

static SIG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{130}$").expect("valid regex"));

impl<'de> Deserialize<'de> for EvmSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if !SIG_REGEX.is_match(&s) {
            return Err(D::Error::custom(
                "invalid signature format: must be 0x-prefixed and 130 hex chars",
            ));
        }
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| D::Error::custom("failed to decode signature hex string"))?;
        let array: [u8; 65] = bytes
            .try_into()
            .map_err(|_| D::Error::custom("signature must be exactly 65 bytes"))?;
        Ok(EvmSignature(array))
    }
}

impl Serialize for EvmSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl EvmSignature {
    pub fn r(&self) -> B256 {
        B256::from_slice(&self.0[0..32])
    }

    pub fn s(&self) -> B256 {
        B256::from_slice(&self.0[32..64])
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Recovers the alloy-native `Signature` for use with `recover_address_from_prehash`.
    pub fn as_alloy(&self) -> Result<alloy_primitives::Signature, alloy_primitives::SignatureError> {
        alloy_primitives::Signature::from_raw_array(&self.0)
    }
}

/// A transaction hash, as returned from submission or observed by the indexer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 32-byte opaque client-chosen identifier making an authorization unique.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonce(pub B256);

impl Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use crate::timestamp::UnixTimestamp;

/// A signed payment authorization submitted by a client to the Settlement Service.
///
/// Unknown fields are rejected so malformed or forward-incompatible payloads
/// fail fast rather than silently dropping data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentAuthorization {
    pub owner: Address,
    pub recipient: Address,
    #[serde(with = "u256_string")]
    pub value: U256,
    pub deadline: UnixTimestamp,
    pub nonce: Nonce,
    pub permit_signature: EvmSignature,
    pub auth_signature: EvmSignature,
}

impl PaymentAuthorization {
    /// `true` when the structural parameters are well-formed: nonzero value,
    /// nonzero owner and recipient. Does not check the deadline, which needs
    /// an injected clock.
    pub fn has_valid_parameters(&self) -> bool {
        self.value > U256::ZERO && !self.owner.is_zero() && !self.recipient.is_zero()
    }
}

/// `U256` serialized as a decimal string, since JSON numbers cannot losslessly
/// carry 256-bit integers.
mod u256_string {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<U256>()
            .map_err(|e| serde::de::Error::custom(format!("invalid U256: {e}")))
    }
}

/// Platform fee cap: `fee_bps <= 1_000` (10%).
pub const MAX_FEE_BPS: u32 = 1_000;

/// Computes `platform_fee = floor(value * fee_bps / 10_000)` and the
/// recipient's credit, `value - platform_fee`. Always conserves value exactly:
/// `recipient_credit + platform_fee == value`.
pub fn compute_fee(value: U256, fee_bps: u32) -> (U256 /* platform_fee */, U256 /* recipient_credit */) {
    let fee_bps = U256::from(fee_bps.min(MAX_FEE_BPS));
    let platform_fee = value * fee_bps / U256::from(10_000u32);
    let recipient_credit = value - platform_fee;
    (platform_fee, recipient_credit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rounds_down_and_conserves_value() {
        let value = U256::from(10_000_000u64);
        let (fee, credit) = compute_fee(value, 100);
        assert_eq!(fee, U256::from(100_000u64));
        assert_eq!(credit, U256::from(9_900_000u64));
        assert_eq!(fee + credit, value);
    }

    #[test]
    fn minimum_value_rounds_fee_to_zero() {
        let value = U256::from(1u64);
        let (fee, credit) = compute_fee(value, 100);
        assert_eq!(fee, U256::ZERO);
        assert_eq!(credit, U256::from(1u64));
    }

    #[test]
    fn fee_bps_is_capped_at_max() {
        let value = U256::from(1_000_000u64);
        let (fee_a, _) = compute_fee(value, MAX_FEE_BPS);
        let (fee_b, _) = compute_fee(value, MAX_FEE_BPS + 5_000);
        assert_eq!(fee_a, fee_b);
    }
}
