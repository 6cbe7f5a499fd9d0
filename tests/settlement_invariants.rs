use alloy_primitives::{address, B256, U256};
use s402_core::types::{compute_fee, EvmSignature, Nonce, PaymentAuthorization};
use s402_core::timestamp::UnixTimestamp;

fn sample(value: u64, deadline: u64) -> PaymentAuthorization {
    PaymentAuthorization {
        owner: address!("0x0000000000000000000000000000000000000001"),
        recipient: address!("0x0000000000000000000000000000000000000002"),
        value: U256::from(value),
        deadline: UnixTimestamp(deadline),
        nonce: Nonce(B256::ZERO),
        permit_signature: EvmSignature([0u8; 65]),
        auth_signature: EvmSignature([0u8; 65]),
    }
}

#[test]
fn fee_integrity_holds_for_the_documented_scenario() {
    let payment = sample(10_000_000, 1_000);
    let (fee, credit) = compute_fee(payment.value, 100);
    assert_eq!(fee, U256::from(100_000u64));
    assert_eq!(credit, U256::from(9_900_000u64));
    assert_eq!(fee + credit, payment.value);
}

#[test]
fn minimum_value_payment_has_zero_fee_and_full_credit() {
    let payment = sample(1, 1_000);
    let (fee, credit) = compute_fee(payment.value, 100);
    assert_eq!(fee, U256::ZERO);
    assert_eq!(credit, U256::from(1u64));
}

#[test]
fn structural_validity_rejects_zero_value_and_zero_addresses() {
    let mut payment = sample(0, 1_000);
    assert!(!payment.has_valid_parameters());

    payment.value = U256::from(1u64);
    payment.owner = alloy_primitives::Address::ZERO;
    assert!(!payment.has_valid_parameters());
}

#[test]
fn payment_authorization_round_trips_through_json() {
    let payment = sample(500_000, 2_000);
    let json = serde_json::to_string(&payment).unwrap();
    let parsed: PaymentAuthorization = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.value, payment.value);
    assert_eq!(parsed.deadline, payment.deadline);
}

#[test]
fn unknown_fields_are_rejected() {
    let payment = sample(500_000, 2_000);
    let mut json: serde_json::Value = serde_json::to_value(&payment).unwrap();
    json["unexpectedField"] = serde_json::Value::Bool(true);
    let result: Result<PaymentAuthorization, _> = serde_json::from_value(json);
    assert!(result.is_err());
}
