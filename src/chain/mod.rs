//! Single-chain EVM provider: submits settlement transactions and serves
//! the indexer's event/log/timestamp queries.

pub mod contracts;

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::chain::contracts::{IErc20Permit, IS402Facilitator};
use crate::types::{Nonce, TransactionHash};

/// One observed `PaymentSettled` event, with the chain-provided context the
/// indexer needs to build an `IndexedPayment` row.
#[derive(Debug, Clone)]
pub struct PaymentSettledLog {
    pub tx_hash: TransactionHash,
    pub block_number: u64,
    pub log_index: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub platform_fee: U256,
    pub nonce: Nonce,
}

/// Errors surfaced by chain interaction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("rpc call failed: {0}")]
    Rpc(String),
    #[error("contract call reverted: {0}")]
    ContractRevert(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),
}

impl From<url::ParseError> for ChainError {
    fn from(e: url::ParseError) -> Self {
        ChainError::InvalidUrl(e.to_string())
    }
}

/// Base delay for the first retry; doubles on each subsequent attempt.
const RPC_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Async operations needed from an EVM chain, abstracted so `SettlementService`
/// and `Indexer` can run against a hand-written fake in tests instead of a
/// live node.
#[async_trait]
pub trait ChainOps: Send + Sync {
    fn chain_id(&self) -> u64;
    fn facilitator_address(&self) -> Address;
    fn token_address(&self) -> Address;

    async fn token_nonce(&self, owner: Address) -> Result<U256, ChainError>;
    async fn token_name(&self) -> Result<String, ChainError>;
    async fn get_stats(&self, account: Address) -> Result<(U256, U256), ChainError>;

    async fn is_payment_used(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
    ) -> Result<bool, ChainError>;

    async fn get_payment_hash(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
    ) -> Result<B256, ChainError>;

    async fn settle_payment_with_permit(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
        permit_sig: Vec<u8>,
        auth_sig: Vec<u8>,
    ) -> Result<TransactionHash, ChainError>;

    async fn batch_settle_payments(
        &self,
        payments: Vec<(Address, Address, U256, U256, B256)>,
        permit_sigs: Vec<Vec<u8>>,
        auth_sigs: Vec<Vec<u8>>,
    ) -> Result<TransactionHash, ChainError>;

    async fn head_block_number(&self) -> Result<u64, ChainError>;

    async fn fetch_payment_settled(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PaymentSettledLog>, ChainError>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError>;
}

/// Thin wrapper around an Alloy provider bound to one network and one
/// facilitator contract address.
#[derive(Clone)]
pub struct EvmChain {
    provider: alloy_provider::RootProvider,
    wallet_provider: RootProviderWithWallet,
    facilitator_address: Address,
    token_address: Address,
    chain_id: u64,
    rpc_timeout: Duration,
    rpc_max_retries: u32,
}

/// Alias kept distinct from the plain `RootProvider` so call sites are explicit
/// about which provider can sign and which can only read.
type RootProviderWithWallet = alloy_provider::fillers::FillProvider<
    alloy_provider::fillers::JoinFill<
        alloy_provider::Identity,
        alloy_provider::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy_provider::RootProvider,
>;

impl EvmChain {
    /// Connects to `rpc_url`, using `private_key` to sign submitted
    /// transactions. `chain_id` is read back from the node and compared
    /// against the configured value to fail fast on misconfiguration.
    #[instrument(skip(private_key))]
    #[allow(clippy::too_many_arguments)]
    pub async fn connect(
        rpc_url: &Url,
        private_key: &str,
        facilitator_address: Address,
        token_address: Address,
        expected_chain_id: u64,
        rpc_timeout: Duration,
        rpc_max_retries: u32,
    ) -> Result<Self, ChainError> {
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
        let wallet = EthereumWallet::from(signer);

        let read_provider = ProviderBuilder::new().connect_http(rpc_url.clone());
        let wallet_provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url.clone());

        let chain = Self {
            provider: read_provider,
            wallet_provider,
            facilitator_address,
            token_address,
            chain_id: expected_chain_id,
            rpc_timeout,
            rpc_max_retries,
        };

        let observed_chain_id = chain
            .call_with_retry(|| async { chain.provider.get_chain_id().await.map_err(|e| ChainError::Rpc(e.to_string())) })
            .await?;
        if observed_chain_id != expected_chain_id {
            return Err(ChainError::Rpc(format!(
                "configured chain_id {expected_chain_id} does not match node's {observed_chain_id}"
            )));
        }

        Ok(chain)
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn facilitator_address(&self) -> Address {
        self.facilitator_address
    }

    pub fn token_address(&self) -> Address {
        self.token_address
    }

    fn facilitator(&self) -> IS402Facilitator::IS402FacilitatorInstance<&alloy_provider::RootProvider> {
        IS402Facilitator::new(self.facilitator_address, &self.provider)
    }

    fn facilitator_writable(
        &self,
    ) -> IS402Facilitator::IS402FacilitatorInstance<&RootProviderWithWallet> {
        IS402Facilitator::new(self.facilitator_address, &self.wallet_provider)
    }

    fn token(&self) -> IErc20Permit::IErc20PermitInstance<&alloy_provider::RootProvider> {
        IErc20Permit::new(self.token_address, &self.provider)
    }

    /// Runs `attempt` under a per-call timeout, retrying transient RPC
    /// failures (timeouts and transport errors) with exponential backoff up
    /// to `rpc_max_retries` times before propagating. Contract reverts are
    /// deterministic and returned immediately without retrying — the
    /// on-chain replay guard makes resubmitting a reverted settlement safe,
    /// but pointless to retry blindly.
    async fn call_with_retry<T, F, Fut>(&self, mut attempt: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ChainError>>,
    {
        let mut last_err = None;
        for attempt_no in 0..=self.rpc_max_retries {
            let outcome = match tokio::time::timeout(self.rpc_timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(ChainError::Rpc(format!(
                    "rpc call timed out after {:?}",
                    self.rpc_timeout
                ))),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(ChainError::ContractRevert(msg)) => return Err(ChainError::ContractRevert(msg)),
                Err(e) => {
                    last_err = Some(e);
                    if attempt_no < self.rpc_max_retries {
                        let delay = RPC_RETRY_BASE_DELAY * 2u32.pow(attempt_no);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }

    /// `nonces(owner)` view on the payment token — the permit nonce that must
    /// appear in the signed `Permit` struct.
    #[instrument(skip(self))]
    pub async fn token_nonce(&self, owner: Address) -> Result<U256, ChainError> {
        self.call_with_retry(|| async {
            self.token()
                .nonces(owner)
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))
        })
        .await
    }

    /// `name()` view on the payment token — used to build its EIP-712 permit domain.
    #[instrument(skip(self))]
    pub async fn token_name(&self) -> Result<String, ChainError> {
        self.call_with_retry(|| async {
            self.token()
                .name()
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))
        })
        .await
    }

    /// `getStats(account)` view — used to refresh a `ProviderAggregate` row.
    #[instrument(skip(self))]
    pub async fn get_stats(&self, account: Address) -> Result<(U256, U256), ChainError> {
        self.call_with_retry(|| async {
            let result = self
                .facilitator()
                .getStats(account)
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))?;
            Ok((result.totalPaid, result.totalReceived))
        })
        .await
    }

    /// `isPaymentUsed(...)` view — the pre-submission replay check.
    #[instrument(skip(self))]
    pub async fn is_payment_used(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
    ) -> Result<bool, ChainError> {
        self.call_with_retry(|| async {
            self.facilitator()
                .isPaymentUsed(owner, recipient, value, deadline, nonce)
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))
        })
        .await
    }

    /// `getPaymentHash(...)` view — the on-chain counterpart to the locally
    /// computed replay hash, used to assert the two are bit-identical before
    /// ever trusting `isPaymentUsed`'s answer.
    #[instrument(skip(self))]
    pub async fn get_payment_hash(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
    ) -> Result<B256, ChainError> {
        self.call_with_retry(|| async {
            self.facilitator()
                .getPaymentHash(owner, recipient, value, deadline, nonce)
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))
        })
        .await
    }

    /// `platformFeeBps()` view — read once at startup.
    #[instrument(skip(self))]
    pub async fn platform_fee_bps(&self) -> Result<u32, ChainError> {
        self.call_with_retry(|| async {
            let bps = self
                .facilitator()
                .platformFeeBps()
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))?;
            Ok(bps.to::<u32>())
        })
        .await
    }

    /// `usdc()` view — the configured stable-token address.
    #[instrument(skip(self))]
    pub async fn usdc_address(&self) -> Result<Address, ChainError> {
        self.call_with_retry(|| async {
            self.facilitator()
                .usdc()
                .call()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))
        })
        .await
    }

    /// Submits `settlePaymentWithPermit` and waits for a receipt.
    #[instrument(skip(self, permit_sig, auth_sig))]
    pub async fn settle_payment_with_permit(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
        permit_sig: Vec<u8>,
        auth_sig: Vec<u8>,
    ) -> Result<TransactionHash, ChainError> {
        self.call_with_retry(|| async {
            let payment = IS402Facilitator::PaymentAuthorization {
                owner,
                recipient,
                value,
                deadline,
                nonce,
            };
            let pending = self
                .facilitator_writable()
                .settlePaymentWithPermit(payment, permit_sig.clone().into(), auth_sig.clone().into())
                .send()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
            if !receipt.status() {
                return Err(ChainError::ContractRevert(
                    "transaction reverted".to_string(),
                ));
            }
            Ok(TransactionHash(receipt.transaction_hash))
        })
        .await
    }

    /// Submits `batchSettlePayments`; all-or-nothing, one transaction.
    #[instrument(skip(self, permit_sigs, auth_sigs))]
    pub async fn batch_settle_payments(
        &self,
        payments: Vec<(Address, Address, U256, U256, B256)>,
        permit_sigs: Vec<Vec<u8>>,
        auth_sigs: Vec<Vec<u8>>,
    ) -> Result<TransactionHash, ChainError> {
        self.call_with_retry(|| async {
            let payments: Vec<_> = payments
                .iter()
                .map(|(owner, recipient, value, deadline, nonce)| IS402Facilitator::PaymentAuthorization {
                    owner: *owner,
                    recipient: *recipient,
                    value: *value,
                    deadline: *deadline,
                    nonce: *nonce,
                })
                .collect();
            let permit_sigs: Vec<_> = permit_sigs.iter().cloned().map(Into::into).collect();
            let auth_sigs: Vec<_> = auth_sigs.iter().cloned().map(Into::into).collect();
            let pending = self
                .facilitator_writable()
                .batchSettlePayments(payments, permit_sigs, auth_sigs)
                .send()
                .await
                .map_err(|e| ChainError::ContractRevert(e.to_string()))?;
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
            if !receipt.status() {
                return Err(ChainError::ContractRevert(
                    "batch transaction reverted".to_string(),
                ));
            }
            Ok(TransactionHash(receipt.transaction_hash))
        })
        .await
    }

    /// Current chain head block number.
    #[instrument(skip(self))]
    pub async fn head_block_number(&self) -> Result<u64, ChainError> {
        self.call_with_retry(|| async {
            self.provider
                .get_block_number()
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))
        })
        .await
    }

    /// Fetches `PaymentSettled` logs in `[from_block, to_block]` inclusive,
    /// ordered ascending by `(block_number, log_index)`.
    #[instrument(skip(self))]
    pub async fn fetch_payment_settled(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PaymentSettledLog>, ChainError> {
        self.call_with_retry(|| async {
            let filter = Filter::new()
                .address(self.facilitator_address)
                .event_signature(IS402Facilitator::PaymentSettled::SIGNATURE_HASH)
                .from_block(BlockNumberOrTag::Number(from_block))
                .to_block(BlockNumberOrTag::Number(to_block));
            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?;

            let mut out = Vec::with_capacity(logs.len());
            for log in logs {
                let block_number = log
                    .block_number
                    .ok_or_else(|| ChainError::Rpc("log missing block_number".to_string()))?;
                let log_index = log
                    .log_index
                    .ok_or_else(|| ChainError::Rpc("log missing log_index".to_string()))?;
                let tx_hash = log
                    .transaction_hash
                    .ok_or_else(|| ChainError::Rpc("log missing transaction_hash".to_string()))?;
                let decoded = log
                    .log_decode::<IS402Facilitator::PaymentSettled>()
                    .map_err(|e| ChainError::Rpc(format!("failed to decode PaymentSettled: {e}")))?;
                let event = decoded.inner.data;
                out.push(PaymentSettledLog {
                    tx_hash: TransactionHash(tx_hash),
                    block_number,
                    log_index,
                    from: event.from,
                    to: event.to,
                    value: event.value,
                    platform_fee: event.platformFee,
                    nonce: Nonce(event.nonce),
                });
            }
            out.sort_by_key(|l| (l.block_number, l.log_index));
            Ok(out)
        })
        .await
    }

    /// Block header timestamp for `block_number`.
    #[instrument(skip(self))]
    pub async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        self.call_with_retry(|| async {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number))
                .await
                .map_err(|e| ChainError::Rpc(e.to_string()))?
                .ok_or_else(|| ChainError::Rpc(format!("block {block_number} not found")))?;
            Ok(block.header.timestamp)
        })
        .await
    }
}

#[async_trait]
impl ChainOps for EvmChain {
    fn chain_id(&self) -> u64 {
        EvmChain::chain_id(self)
    }

    fn facilitator_address(&self) -> Address {
        EvmChain::facilitator_address(self)
    }

    fn token_address(&self) -> Address {
        EvmChain::token_address(self)
    }

    async fn token_nonce(&self, owner: Address) -> Result<U256, ChainError> {
        EvmChain::token_nonce(self, owner).await
    }

    async fn token_name(&self) -> Result<String, ChainError> {
        EvmChain::token_name(self).await
    }

    async fn get_stats(&self, account: Address) -> Result<(U256, U256), ChainError> {
        EvmChain::get_stats(self, account).await
    }

    async fn is_payment_used(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
    ) -> Result<bool, ChainError> {
        EvmChain::is_payment_used(self, owner, recipient, value, deadline, nonce).await
    }

    async fn get_payment_hash(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
    ) -> Result<B256, ChainError> {
        EvmChain::get_payment_hash(self, owner, recipient, value, deadline, nonce).await
    }

    async fn settle_payment_with_permit(
        &self,
        owner: Address,
        recipient: Address,
        value: U256,
        deadline: U256,
        nonce: B256,
        permit_sig: Vec<u8>,
        auth_sig: Vec<u8>,
    ) -> Result<TransactionHash, ChainError> {
        EvmChain::settle_payment_with_permit(self, owner, recipient, value, deadline, nonce, permit_sig, auth_sig).await
    }

    async fn batch_settle_payments(
        &self,
        payments: Vec<(Address, Address, U256, U256, B256)>,
        permit_sigs: Vec<Vec<u8>>,
        auth_sigs: Vec<Vec<u8>>,
    ) -> Result<TransactionHash, ChainError> {
        EvmChain::batch_settle_payments(self, payments, permit_sigs, auth_sigs).await
    }

    async fn head_block_number(&self) -> Result<u64, ChainError> {
        EvmChain::head_block_number(self).await
    }

    async fn fetch_payment_settled(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PaymentSettledLog>, ChainError> {
        EvmChain::fetch_payment_settled(self, from_block, to_block).await
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
        EvmChain::block_timestamp(self, block_number).await
    }
}
