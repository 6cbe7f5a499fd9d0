//! Verifies client-supplied payment authorizations and submits settlement
//! transactions to the on-chain facilitator.

pub mod verify;

use alloy_primitives::U256;
use alloy_sol_types::Eip712Domain;
use tracing::{instrument, warn};

use crate::chain::{ChainError, ChainOps};
use crate::eip712::{authorization_signing_hash, facilitator_domain, payment_hash, permit_signing_hash, token_domain};
use crate::settlement::verify::recover_signer;
use crate::timestamp::Clock;
use crate::types::{PaymentAuthorization, TransactionHash};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("invalid payment parameters")]
    InvalidParams,
    #[error("payment deadline has passed")]
    DeadlineExpired,
    #[error("payment has already been settled")]
    AlreadyUsed,
    #[error("permit signature does not recover to owner")]
    BadPermitSignature,
    #[error("authorization signature does not recover to owner")]
    BadAuthSignature,
    #[error("locally computed payment hash does not match the on-chain getPaymentHash result")]
    HashMismatch,
    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),
    #[error("insufficient balance to settle payment")]
    InsufficientBalance,
    #[error("facilitator is paused")]
    Paused,
}

impl From<ChainError> for SettlementError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::Rpc(msg) => SettlementError::RpcUnavailable(msg),
            ChainError::ContractRevert(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("insufficient") {
                    SettlementError::InsufficientBalance
                } else if lower.contains("pause") {
                    SettlementError::Paused
                } else if lower.contains("used") {
                    SettlementError::AlreadyUsed
                } else {
                    SettlementError::RpcUnavailable(msg)
                }
            }
            ChainError::InvalidKey(msg) => SettlementError::RpcUnavailable(msg),
            ChainError::InvalidUrl(msg) => SettlementError::RpcUnavailable(msg),
        }
    }
}

/// Per-item outcome of a reverted batch, filled in by replaying the
/// verification pipeline against each authorization. `None` means that item,
/// on its own, still looks settleable.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatus {
    pub index: usize,
    pub error: Option<SettlementError>,
}

pub struct SettlementService<Ch: ChainOps, C: Clock> {
    chain: Ch,
    facilitator_domain: Eip712Domain,
    token_domain: Eip712Domain,
    clock: C,
}

impl<Ch: ChainOps, C: Clock> SettlementService<Ch, C> {
    pub fn new(chain: Ch, token_name: &str, clock: C) -> Self {
        let facilitator_domain = facilitator_domain(chain.chain_id(), chain.facilitator_address());
        let token_domain = token_domain(token_name, "1", chain.chain_id(), chain.token_address());
        Self {
            chain,
            facilitator_domain,
            token_domain,
            clock,
        }
    }

    /// Local cache over the chain's `isPaymentUsed` view; never authoritative
    /// for rejecting a submission, only for cheap pre-flight display.
    #[instrument(skip(self))]
    pub async fn is_used(&self, payment: &PaymentAuthorization) -> Result<bool, SettlementError> {
        let used = self
            .chain
            .is_payment_used(
                payment.owner,
                payment.recipient,
                payment.value,
                payment.deadline.into(),
                payment.nonce.0,
            )
            .await?;
        Ok(used)
    }

    #[instrument(skip(self, payment))]
    async fn verify(&self, payment: &PaymentAuthorization) -> Result<(), SettlementError> {
        if !payment.has_valid_parameters() {
            return Err(SettlementError::InvalidParams);
        }
        if payment.deadline < self.clock.now() {
            return Err(SettlementError::DeadlineExpired);
        }

        let deadline_u256 = U256::from(payment.deadline);
        let local_hash = payment_hash(
            payment.owner,
            payment.recipient,
            payment.value,
            deadline_u256,
            payment.nonce.0,
        );
        let onchain_hash = self
            .chain
            .get_payment_hash(
                payment.owner,
                payment.recipient,
                payment.value,
                deadline_u256,
                payment.nonce.0,
            )
            .await?;
        if local_hash != onchain_hash {
            return Err(SettlementError::HashMismatch);
        }

        let used = self
            .chain
            .is_payment_used(
                payment.owner,
                payment.recipient,
                payment.value,
                deadline_u256,
                payment.nonce.0,
            )
            .await?;
        if used {
            return Err(SettlementError::AlreadyUsed);
        }

        let facilitator_address = self.chain.facilitator_address();

        let token_nonce = self.chain.token_nonce(payment.owner).await?;
        let permit_digest = permit_signing_hash(
            &self.token_domain,
            payment.owner,
            facilitator_address,
            payment.value,
            token_nonce,
            deadline_u256,
        );
        if recover_signer(permit_digest, &payment.permit_signature) != Some(payment.owner) {
            return Err(SettlementError::BadPermitSignature);
        }

        let auth_digest = authorization_signing_hash(
            &self.facilitator_domain,
            payment.owner,
            facilitator_address,
            payment.value,
            deadline_u256,
            payment.recipient,
            payment.nonce.0,
        );
        if recover_signer(auth_digest, &payment.auth_signature) != Some(payment.owner) {
            return Err(SettlementError::BadAuthSignature);
        }

        Ok(())
    }

    /// Verifies and submits a single authorization.
    #[instrument(skip(self, payment))]
    pub async fn settle(&self, payment: &PaymentAuthorization) -> Result<TransactionHash, SettlementError> {
        self.verify(payment).await?;
        let tx_hash = self
            .chain
            .settle_payment_with_permit(
                payment.owner,
                payment.recipient,
                payment.value,
                U256::from(payment.deadline),
                payment.nonce.0,
                payment.permit_signature.0.to_vec(),
                payment.auth_signature.0.to_vec(),
            )
            .await?;
        Ok(tx_hash)
    }

    /// Verifies every authorization, then submits all of them as one
    /// transaction. On-chain, the batch commits or reverts as a whole; if it
    /// reverts, the verification pipeline is replayed per item to explain why.
    #[instrument(skip(self, payments))]
    pub async fn settle_batch(
        &self,
        payments: &[PaymentAuthorization],
    ) -> Result<(TransactionHash, Vec<ItemStatus>), SettlementError> {
        if payments.is_empty() {
            return Err(SettlementError::InvalidParams);
        }
        for payment in payments {
            self.verify(payment).await?;
        }

        let tuples = payments
            .iter()
            .map(|p| (p.owner, p.recipient, p.value, U256::from(p.deadline), p.nonce.0))
            .collect();
        let permit_sigs = payments.iter().map(|p| p.permit_signature.0.to_vec()).collect();
        let auth_sigs = payments.iter().map(|p| p.auth_signature.0.to_vec()).collect();

        match self.chain.batch_settle_payments(tuples, permit_sigs, auth_sigs).await {
            Ok(tx_hash) => {
                let statuses = (0..payments.len())
                    .map(|index| ItemStatus { index, error: None })
                    .collect();
                Ok((tx_hash, statuses))
            }
            Err(e) => {
                warn!("batch settlement reverted, replaying verification to classify items");
                let mut statuses = Vec::with_capacity(payments.len());
                for (index, payment) in payments.iter().enumerate() {
                    let error = self.verify(payment).await.err();
                    statuses.push(ItemStatus { index, error });
                }
                if statuses.iter().all(|s| s.error.is_none()) {
                    Err(SettlementError::from(e))
                } else {
                    let first = statuses.iter().find_map(|s| s.error.clone());
                    Err(first.unwrap_or_else(|| SettlementError::from(e)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::FixedClock;
    use crate::types::{EvmSignature, Nonce, PaymentAuthorization};
    use alloy_primitives::{address, B256};

    fn sample_payment(deadline: u64) -> PaymentAuthorization {
        PaymentAuthorization {
            owner: address!("0x0000000000000000000000000000000000000001"),
            recipient: address!("0x0000000000000000000000000000000000000002"),
            value: U256::from(100u64),
            deadline: crate::timestamp::UnixTimestamp(deadline),
            nonce: Nonce(B256::ZERO),
            permit_signature: EvmSignature([0u8; 65]),
            auth_signature: EvmSignature([0u8; 65]),
        }
    }

    #[test]
    fn deadline_equal_to_now_is_not_expired() {
        let clock = FixedClock::new(1_000);
        let payment = sample_payment(1_000);
        assert!(!(payment.deadline < clock.now()));
    }

    #[test]
    fn deadline_one_second_in_the_past_is_expired() {
        let clock = FixedClock::new(1_000);
        let payment = sample_payment(999);
        assert!(payment.deadline < clock.now());
    }
}
