//! Solidity interface bindings for the on-chain collaborators.
//!
//! The facilitator contract and the payment token are treated as external
//! collaborators with a fixed ABI; we only need the subset of methods and
//! the one event this core consumes.

use alloy_sol_types::sol;

sol! {
    /// The on-chain facilitator: verifies signatures, moves tokens, charges
    /// the platform fee, and emits `PaymentSettled`.
    #[derive(Debug)]
    #[sol(rpc)]
    interface IS402Facilitator {
        event PaymentSettled(
            address indexed from,
            address indexed to,
            uint256 value,
            uint256 platformFee,
            bytes32 nonce
        );

        function settlePaymentWithPermit(
            PaymentAuthorization calldata payment,
            bytes calldata permitSig,
            bytes calldata authSig
        ) external returns (bytes32 txHash);

        function batchSettlePayments(
            PaymentAuthorization[] calldata payments,
            bytes[] calldata permitSigs,
            bytes[] calldata authSigs
        ) external returns (bytes32 txHash);

        function getStats(address account) external view returns (uint256 totalPaid, uint256 totalReceived);

        function isPaymentUsed(
            address owner,
            address recipient,
            uint256 value,
            uint256 deadline,
            bytes32 nonce
        ) external view returns (bool used);

        function getPaymentHash(
            address owner,
            address recipient,
            uint256 value,
            uint256 deadline,
            bytes32 nonce
        ) external view returns (bytes32 hash);

        function usdc() external view returns (address token);
        function platformFeeBps() external view returns (uint256 bps);
        function owner() external view returns (address operator);

        struct PaymentAuthorization {
            address owner;
            address recipient;
            uint256 value;
            uint256 deadline;
            bytes32 nonce;
        }
    }
}

sol! {
    /// Standard EIP-2612 permit surface of the payment token.
    #[derive(Debug)]
    #[sol(rpc)]
    interface IErc20Permit {
        function permit(
            address owner,
            address spender,
            uint256 value,
            uint256 deadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        function nonces(address owner) external view returns (uint256 nonce);
        function name() external view returns (string memory tokenName);
        function balanceOf(address account) external view returns (uint256 balance);
    }
}
