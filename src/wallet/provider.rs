//! Wallet provider boundary
//!
//! A [`WalletProvider`] supplies account and network primitives, forwards
//! contract reads and writes, and emits [`ProviderEvent`] notifications. Failures
//! carry EIP-1193 style codes so the engine can classify them uniformly.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::USER_REJECTED_CODE;
use crate::protocols::evm::types::{TransactionRequest, TxReceiptSummary};

/// JSON-RPC "internal error"
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Change notification emitted by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Authorized accounts changed. An empty list means the wallet disconnected.
    AccountsChanged(Vec<Address>),
    /// The wallet moved to another chain
    ChainChanged(u64),
}

/// Error reported by a provider, in EIP-1193 shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
    /// Revert reason or raw error data, when present
    pub data: Option<String>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// The user declined a prompt
    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_CODE, "User rejected the request")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR_CODE, message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error {}: {}", self.code, self.message)?;
        if let Some(ref data) = self.data {
            write!(f, " ({})", data)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}

/// Account, network and contract primitives supplied by a wallet
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Accounts already authorized, without prompting
    async fn accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Prompt the user for account access
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Chain the wallet is currently on
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Native balance in base units
    async fn native_balance(&self, address: Address) -> Result<U256, ProviderError>;

    /// Read-only contract call
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError>;

    /// Sign and broadcast a transaction, returning its hash
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, ProviderError>;

    /// Wait until the transaction is mined
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceiptSummary, ProviderError>;

    /// Channel of change notifications, delivered in emission order
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent>;
}

/// Fan-out of provider events to every live subscriber
#[derive(Debug, Default)]
pub struct EventEmitter {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ProviderEvent>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProviderEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    /// Deliver an event, dropping subscribers whose receiver is gone
    pub fn emit(&self, event: ProviderEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_data() {
        let err = ProviderError::new(3, "execution reverted").with_data("Sale closed");
        assert_eq!(
            err.to_string(),
            "provider error 3: execution reverted (Sale closed)"
        );
    }

    #[tokio::test]
    async fn test_emitter_preserves_order_and_prunes() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();
        let dropped = emitter.subscribe();
        drop(dropped);

        emitter.emit(ProviderEvent::ChainChanged(1));
        emitter.emit(ProviderEvent::AccountsChanged(vec![]));

        assert_eq!(rx.recv().await, Some(ProviderEvent::ChainChanged(1)));
        assert_eq!(rx.recv().await, Some(ProviderEvent::AccountsChanged(vec![])));
        assert_eq!(emitter.subscriber_count(), 1);
    }
}
