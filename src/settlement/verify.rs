//! Pure signature-recovery helpers, isolated from I/O so they can run
//! off the async executor and be exercised directly in tests.

use alloy_primitives::{Address, B256};

use crate::types::EvmSignature;

/// Recovers the address that produced `signature` over `digest`.
///
/// Returns `None` on a malformed signature (bad recovery id, point not on
/// curve) rather than propagating the underlying library error — from the
/// caller's point of view a garbled signature and a wrong signer are both
/// just "does not recover to owner".
pub fn recover_signer(digest: B256, signature: &EvmSignature) -> Option<Address> {
    let sig = signature.as_alloy().ok()?;
    sig.recover_address_from_prehash(&digest).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    #[test]
    fn recovers_the_actual_signer() {
        let signer = PrivateKeySigner::from_bytes(&B256::from(U256::from(1u64))).unwrap();
        let digest = B256::repeat_byte(0x42);
        let sig = signer.sign_hash_sync(&digest).unwrap();
        let evm_sig = EvmSignature(sig.as_bytes());
        let recovered = recover_signer(digest, &evm_sig).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn a_different_digest_does_not_recover_to_the_same_signer() {
        let signer = PrivateKeySigner::from_bytes(&B256::from(U256::from(1u64))).unwrap();
        let digest = B256::repeat_byte(0x42);
        let other_digest = B256::repeat_byte(0x43);
        let sig = signer.sign_hash_sync(&digest).unwrap();
        let evm_sig = EvmSignature(sig.as_bytes());
        let recovered = recover_signer(other_digest, &evm_sig).unwrap();
        assert_ne!(recovered, signer.address());
    }
}
