//! JSON-RPC backed wallet provider
//!
//! Pairs an [`EvmClient`] with a [`LocalSigner`]. The signer plays the part of
//! the browser wallet: its address is the authorized account, and switching the
//! account index or the endpoint emits the same notifications a wallet would.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::local::LocalSigner;
use super::provider::{EventEmitter, ProviderError, ProviderEvent, WalletProvider};
use crate::config::SaleConfig;
use crate::error::Error;
use crate::protocols::evm::client::EvmClient;
use crate::protocols::evm::tx::Eip1559Transaction;
use crate::protocols::evm::types::{TransactionRequest, TxReceiptSummary};

/// EIP-1193 "unauthorized" code
pub const UNAUTHORIZED_CODE: i64 = 4100;

/// Headroom added on top of the node's gas estimate, in percent
const GAS_LIMIT_BUFFER_PERCENT: u64 = 20;

/// Wallet provider backed by an EVM endpoint and a locally derived key
pub struct RpcWalletProvider {
    client: RwLock<EvmClient>,
    signer: RwLock<Option<LocalSigner>>,
    mnemonic: Option<Arc<SecretString>>,
    poll_interval: Duration,
    receipt_timeout: Duration,
    events: EventEmitter,
    /// Requests broadcast by this provider, kept to replay reverted calls
    sent: Mutex<HashMap<B256, TransactionRequest>>,
}

impl RpcWalletProvider {
    pub fn new(
        client: EvmClient,
        signer: Option<LocalSigner>,
        mnemonic: Option<Arc<SecretString>>,
    ) -> Self {
        Self {
            client: RwLock::new(client),
            signer: RwLock::new(signer),
            mnemonic,
            poll_interval: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(120),
            events: EventEmitter::new(),
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// Build the endpoint client and, when a mnemonic is configured, the signer
    pub fn from_config(config: &SaleConfig) -> Result<Self, Error> {
        let client = EvmClient::new(&config.rpc_url, config.chain_id)?;
        let signer = match config.mnemonic {
            Some(ref mnemonic) => Some(LocalSigner::from_secret(mnemonic, config.account_index)?),
            None => None,
        };

        Ok(Self::new(client, signer, config.mnemonic.clone())
            .with_receipt_polling(config.receipt_poll_interval, config.receipt_timeout))
    }

    pub fn with_receipt_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.receipt_timeout = timeout;
        self
    }

    async fn client(&self) -> EvmClient {
        self.client.read().await.clone()
    }

    async fn signer_address(&self) -> Option<Address> {
        self.signer.read().await.as_ref().map(LocalSigner::address)
    }

    /// Derive another account from the configured mnemonic and announce it
    pub async fn switch_account(&self, account_index: u32) -> Result<Address, Error> {
        let mnemonic = self
            .mnemonic
            .as_ref()
            .ok_or_else(|| Error::Wallet("No mnemonic configured".to_string()))?;
        let signer = LocalSigner::from_secret(mnemonic, account_index)?;
        let address = signer.address();

        *self.signer.write().await = Some(signer);
        info!("Switched to account {} ({:#x})", account_index, address);
        self.events.emit(ProviderEvent::AccountsChanged(vec![address]));
        Ok(address)
    }

    /// Point the provider at another endpoint and announce the chain change
    pub async fn switch_network(&self, rpc_url: &str, chain_id: u64) -> Result<(), Error> {
        let client = EvmClient::new(rpc_url, chain_id)?;
        *self.client.write().await = client;
        info!("Switched network to chain {} via {}", chain_id, rpc_url);
        self.events.emit(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    /// Forget the signer, as a wallet does when the user disconnects the site
    pub async fn disconnect(&self) {
        *self.signer.write().await = None;
        info!("Local signer disconnected");
        self.events.emit(ProviderEvent::AccountsChanged(Vec::new()));
    }

    /// Re-run a reverted transaction as a call to recover its reason
    async fn replay_revert_reason(&self, tx_hash: B256) -> Option<String> {
        let request = self.sent.lock().await.get(&tx_hash).cloned()?;
        let client = self.client().await;
        match client
            .call(
                Some(request.from),
                request.to,
                request.data.clone(),
                Some(request.value),
            )
            .await
        {
            Ok(_) => None,
            Err(err) => err
                .data
                .or_else(|| crate::error::revert_reason(&err.message)),
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.signer_address().await.into_iter().collect())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        match self.signer_address().await {
            Some(address) => Ok(vec![address]),
            None => Err(ProviderError::user_rejected()),
        }
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.client().await.get_chain_id().await
    }

    async fn native_balance(&self, address: Address) -> Result<U256, ProviderError> {
        self.client().await.get_balance(address).await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        self.client().await.call(None, to, data, None).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ProviderError> {
        let client = self.client().await;

        let chain_id = client.get_chain_id().await?;
        if chain_id != tx.chain_id {
            return Err(ProviderError::internal(format!(
                "Transaction built for chain {} but the wallet is on chain {}",
                tx.chain_id, chain_id
            )));
        }

        let nonce = client.get_transaction_count(tx.from).await?;
        let gas_estimate = client
            .estimate_gas(tx.from, tx.to, tx.data.clone(), tx.value)
            .await?;
        let gas_limit = gas_estimate.saturating_add(gas_estimate * GAS_LIMIT_BUFFER_PERCENT / 100);
        let fees = client.get_fee_data().await?;

        let unsigned = Eip1559Transaction::from_request(&tx, nonce, gas_limit, fees);
        let signed = {
            let signer = self.signer.read().await;
            let signer = signer.as_ref().ok_or_else(ProviderError::user_rejected)?;
            if signer.address() != tx.from {
                return Err(ProviderError::new(
                    UNAUTHORIZED_CODE,
                    format!("Account {:#x} is not authorized", tx.from),
                ));
            }
            signer
                .sign_eip1559(&unsigned)
                .map_err(|e| ProviderError::internal(e.to_string()))?
        };

        debug!(
            "Broadcasting tx nonce={} gas_limit={} value={}",
            nonce, gas_limit, tx.value
        );
        let tx_hash = client.send_raw_transaction(signed.raw()).await?;
        if tx_hash != signed.hash() {
            warn!(
                "Node reported hash {:#x}, locally computed {:#x}",
                tx_hash,
                signed.hash()
            );
        }
        self.sent.lock().await.insert(tx_hash, tx);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceiptSummary, ProviderError> {
        let start_time = Instant::now();
        let client = self.client().await;

        loop {
            if start_time.elapsed() > self.receipt_timeout {
                return Err(ProviderError::internal(format!(
                    "Timed out after {} seconds waiting for transaction {:#x}",
                    self.receipt_timeout.as_secs(),
                    tx_hash
                )));
            }

            if let Some(mut receipt) = client.get_transaction_receipt(tx_hash).await? {
                if !receipt.success {
                    receipt.revert_reason = self.replay_revert_reason(tx_hash).await;
                }
                self.sent.lock().await.remove(&tx_hash);
                return Ok(receipt);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::USER_REJECTED_CODE;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn provider(with_mnemonic: bool) -> RpcWalletProvider {
        let client = EvmClient::new("http://127.0.0.1:8545", 31337).unwrap();
        let mnemonic = with_mnemonic.then(|| Arc::new(SecretString::new(MNEMONIC.to_string())));
        let signer = mnemonic
            .as_ref()
            .map(|m| LocalSigner::from_secret(m, 0).unwrap());
        RpcWalletProvider::new(client, signer, mnemonic)
    }

    #[tokio::test]
    async fn test_without_signer_rejects_connection() {
        let provider = provider(false);
        assert!(provider.accounts().await.unwrap().is_empty());
        let err = provider.request_accounts().await.unwrap_err();
        assert_eq!(err.code, USER_REJECTED_CODE);
        assert!(provider.switch_account(1).await.is_err());
    }

    #[tokio::test]
    async fn test_switch_account_emits_event() {
        let provider = provider(true);
        let mut events = provider.subscribe();
        let before = provider.request_accounts().await.unwrap();

        let address = provider.switch_account(1).await.unwrap();
        assert_ne!(before[0], address);
        assert_eq!(
            events.recv().await,
            Some(ProviderEvent::AccountsChanged(vec![address]))
        );
        assert_eq!(provider.accounts().await.unwrap(), vec![address]);
    }

    #[tokio::test]
    async fn test_switch_network_and_disconnect_emit_events() {
        let provider = provider(true);
        let mut events = provider.subscribe();

        provider
            .switch_network("http://127.0.0.1:9545", 8453)
            .await
            .unwrap();
        provider.disconnect().await;

        assert_eq!(events.recv().await, Some(ProviderEvent::ChainChanged(8453)));
        assert_eq!(
            events.recv().await,
            Some(ProviderEvent::AccountsChanged(Vec::new()))
        );
        assert!(provider.accounts().await.unwrap().is_empty());
    }
}
