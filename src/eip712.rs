//! EIP-712 typed-data domains and structs for the two signatures bound to
//! every payment authorization.
//!
//! - The **authorization signature** is over the facilitator's own
//!   `PaymentAuthorization` struct, binding `recipient` into the signed
//!   payload so a relayer cannot redirect funds.
//! - The **permit signature** is over the token's standard EIP-2612 `Permit`
//!   struct, authorizing the facilitator to pull `value` tokens from `owner`.

use alloy_primitives::{Address, U256, keccak256, B256};
use alloy_sol_types::{eip712_domain, Eip712Domain, SolStruct, sol};

sol! {
    /// Facilitator-side struct binding the full authorization: owner, spender,
    /// value, deadline, recipient, and nonce all signed together so none of
    /// them can be substituted after the fact.
    #[derive(Debug)]
    struct PaymentAuthorizationStruct {
        address owner;
        address spender;
        uint256 value;
        uint256 deadline;
        address recipient;
        bytes32 nonce;
    }
}

sol! {
    /// Standard EIP-2612 permit struct, signed over the token's own domain.
    #[derive(Debug)]
    struct Permit {
        address owner;
        address spender;
        uint256 value;
        uint256 nonce;
        uint256 deadline;
    }
}

/// Domain name/version constants for the facilitator's own typed data.
pub const FACILITATOR_DOMAIN_NAME: &str = "S402Facilitator";
pub const FACILITATOR_DOMAIN_VERSION: &str = "1";

/// Builds the facilitator's EIP-712 domain for a given chain and facilitator address.
pub fn facilitator_domain(chain_id: u64, facilitator_address: Address) -> Eip712Domain {
    eip712_domain! {
        name: FACILITATOR_DOMAIN_NAME,
        version: FACILITATOR_DOMAIN_VERSION,
        chain_id: chain_id,
        verifying_contract: facilitator_address,
    }
}

/// Builds the token's EIP-712 domain for EIP-2612 `Permit` signatures.
///
/// `token_name`/`token_version` come from the token contract itself (typically
/// `name()` and `"1"`), resolved at startup and cached by the caller.
pub fn token_domain(
    token_name: &str,
    token_version: &str,
    chain_id: u64,
    token_address: Address,
) -> Eip712Domain {
    eip712_domain! {
        name: token_name,
        version: token_version,
        chain_id: chain_id,
        verifying_contract: token_address,
    }
}

/// Computes the EIP-712 signing hash for the facilitator's `PaymentAuthorization`
/// struct under the given domain.
pub fn authorization_signing_hash(
    domain: &Eip712Domain,
    owner: Address,
    spender: Address,
    value: U256,
    deadline: U256,
    recipient: Address,
    nonce: B256,
) -> B256 {
    let message = PaymentAuthorizationStruct {
        owner,
        spender,
        value,
        deadline,
        recipient,
        nonce,
    };
    message.eip712_signing_hash(domain)
}

/// Computes the EIP-712 signing hash for an EIP-2612 `Permit` struct.
pub fn permit_signing_hash(
    domain: &Eip712Domain,
    owner: Address,
    spender: Address,
    value: U256,
    token_nonce: U256,
    deadline: U256,
) -> B256 {
    let message = Permit {
        owner,
        spender,
        value,
        nonce: token_nonce,
        deadline,
    };
    message.eip712_signing_hash(domain)
}

/// Computes `keccak256(owner || recipient || value || deadline || nonce)`, the
/// replay-check hash used to ask the facilitator whether a payment has
/// already been settled. Must bit-match the on-chain `getPaymentHash` view:
/// a raw concatenation (Solidity `abi.encodePacked`), not an EIP-712 typed hash.
pub fn payment_hash(owner: Address, recipient: Address, value: U256, deadline: U256, nonce: B256) -> B256 {
    let mut bytes = Vec::with_capacity(20 + 20 + 32 + 32 + 32);
    bytes.extend_from_slice(owner.as_slice());
    bytes.extend_from_slice(recipient.as_slice());
    bytes.extend_from_slice(&value.to_be_bytes::<32>());
    bytes.extend_from_slice(&deadline.to_be_bytes::<32>());
    bytes.extend_from_slice(nonce.as_slice());
    keccak256(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn payment_hash_is_deterministic() {
        let owner = address!("0x0000000000000000000000000000000000000001");
        let recipient = address!("0x0000000000000000000000000000000000000002");
        let value = U256::from(100u64);
        let deadline = U256::from(1_000_000u64);
        let nonce = B256::ZERO;
        let a = payment_hash(owner, recipient, value, deadline, nonce);
        let b = payment_hash(owner, recipient, value, deadline, nonce);
        assert_eq!(a, b);
    }

    #[test]
    fn payment_hash_changes_with_recipient() {
        let owner = address!("0x0000000000000000000000000000000000000001");
        let recipient_a = address!("0x0000000000000000000000000000000000000002");
        let recipient_b = address!("0x0000000000000000000000000000000000000003");
        let value = U256::from(100u64);
        let deadline = U256::from(1_000_000u64);
        let nonce = B256::ZERO;
        let a = payment_hash(owner, recipient_a, value, deadline, nonce);
        let b = payment_hash(owner, recipient_b, value, deadline, nonce);
        assert_ne!(a, b);
    }

    #[test]
    fn authorization_signing_hash_binds_recipient() {
        let domain = facilitator_domain(8453, Address::ZERO);
        let owner = address!("0x0000000000000000000000000000000000000001");
        let spender = Address::ZERO;
        let value = U256::from(1u64);
        let deadline = U256::from(1u64);
        let nonce = B256::ZERO;
        let recipient_a = address!("0x0000000000000000000000000000000000000002");
        let recipient_b = address!("0x0000000000000000000000000000000000000003");
        let hash_a =
            authorization_signing_hash(&domain, owner, spender, value, deadline, recipient_a, nonce);
        let hash_b =
            authorization_signing_hash(&domain, owner, spender, value, deadline, recipient_b, nonce);
        assert_ne!(hash_a, hash_b);
    }
}
