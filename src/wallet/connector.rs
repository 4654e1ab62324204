//! Wallet connection lifecycle
//!
//! [`WalletConnector`] is the single owner of [`WalletState`]. Every transition
//! (connect, account switch, disconnect, network reset) bumps the session epoch,
//! so results issued for an older [`WalletIdentity`] can be recognised and dropped.

use alloy_primitives::Address;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::provider::WalletProvider;
use crate::error::Error;
use crate::protocols::evm::types::Amount;

/// Locally held wallet facts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletState {
    pub connected: bool,
    pub address: Option<Address>,
    pub native_balance: Amount,
    pub chain_id: Option<u64>,
}

impl WalletState {
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// The wallet session a read or write was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WalletIdentity {
    pub address: Address,
    pub chain_id: u64,
    pub epoch: u64,
}

#[derive(Debug, Default)]
struct Session {
    state: WalletState,
    epoch: u64,
}

impl Session {
    fn identity(&self) -> Option<WalletIdentity> {
        match (self.state.connected, self.state.address, self.state.chain_id) {
            (true, Some(address), Some(chain_id)) => Some(WalletIdentity {
                address,
                chain_id,
                epoch: self.epoch,
            }),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.state = WalletState::disconnected();
        self.epoch += 1;
    }
}

/// Owns the connection lifecycle and the wallet state
pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
    session: RwLock<Session>,
}

impl WalletConnector {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            provider,
            session: RwLock::new(Session::default()),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// The provider, or [`Error::ProviderMissing`]
    pub fn provider(&self) -> Result<Arc<dyn WalletProvider>, Error> {
        self.provider.clone().ok_or(Error::ProviderMissing)
    }

    pub async fn state(&self) -> WalletState {
        self.session.read().await.state.clone()
    }

    /// Identity of the current session, when connected on a known chain
    pub async fn identity(&self) -> Option<WalletIdentity> {
        self.session.read().await.identity()
    }

    pub async fn epoch(&self) -> u64 {
        self.session.read().await.epoch
    }

    /// Whether `identity` is still the live session
    pub async fn is_current(&self, identity: &WalletIdentity) -> bool {
        self.identity().await.as_ref() == Some(identity)
    }

    /// Adopt already-authorized accounts without prompting.
    ///
    /// A missing provider or a provider failure leaves the wallet disconnected.
    pub async fn probe_existing_connection(&self) -> Option<WalletIdentity> {
        let Some(provider) = self.provider.clone() else {
            debug!("No wallet provider present, staying disconnected");
            return None;
        };
        let epoch = self.epoch().await;

        let accounts = match provider.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("Failed to query authorized accounts: {}", e);
                return None;
            }
        };
        let Some(&address) = accounts.first() else {
            debug!("No authorized accounts");
            return None;
        };

        let chain_id = match provider.chain_id().await {
            Ok(chain_id) => Some(chain_id),
            Err(e) => {
                warn!("Failed to query chain id: {}", e);
                None
            }
        };

        match self.establish(epoch, address, chain_id).await {
            Ok(identity) => {
                info!("Found existing connection for {:#x}", address);
                identity
            }
            Err(_) => {
                debug!("Probe superseded by a newer wallet transition");
                self.identity().await
            }
        }
    }

    /// Prompt for account access and connect to the first account
    pub async fn request_connection(&self) -> Result<WalletIdentity, Error> {
        let provider = self.provider()?;
        let epoch = self.epoch().await;

        let accounts = provider.request_accounts().await?;
        let address = *accounts.first().ok_or(Error::UserRejected)?;
        let chain_id = provider.chain_id().await?;

        let identity = self
            .establish(epoch, address, Some(chain_id))
            .await?
            .ok_or(Error::NotConnected)?;
        info!(
            "Wallet connected: {:#x} on chain {}",
            identity.address, identity.chain_id
        );
        Ok(identity)
    }

    /// Provider reported a new account list
    ///
    /// Returns the identity to refresh for, or `None` after a disconnect.
    pub async fn on_accounts_changed(&self, accounts: &[Address]) -> Option<WalletIdentity> {
        let Some(&address) = accounts.first() else {
            self.disconnect().await;
            return None;
        };

        let known_chain = {
            let session = self.session.read().await;
            if session.state.connected && session.state.address == Some(address) {
                debug!("Active account unchanged ({:#x})", address);
                return session.identity();
            }
            session.state.chain_id
        };

        let chain_id = match known_chain {
            Some(chain_id) => Some(chain_id),
            None => match self.provider.as_ref() {
                Some(provider) => provider.chain_id().await.ok(),
                None => None,
            },
        };

        let mut session = self.session.write().await;
        session.state = WalletState {
            connected: true,
            address: Some(address),
            native_balance: Amount::ZERO,
            chain_id,
        };
        session.epoch += 1;
        info!("Active account switched to {:#x}", address);
        session.identity()
    }

    /// Full reset to disconnected. Balance is zeroed.
    pub async fn disconnect(&self) {
        self.session.write().await.reset();
        info!("Wallet disconnected");
    }

    /// Network change: drop everything. The caller re-probes afterwards.
    pub async fn reset(&self) -> u64 {
        let mut session = self.session.write().await;
        session.reset();
        debug!("Wallet session reset (epoch {})", session.epoch);
        session.epoch
    }

    /// Apply a balance read if it was issued for the live session
    pub async fn apply_balance(&self, identity: &WalletIdentity, balance: Amount) -> Result<(), Error> {
        let mut session = self.session.write().await;
        if session.identity().as_ref() != Some(identity) {
            return Err(Error::StaleResultDiscarded);
        }
        session.state.native_balance = balance;
        Ok(())
    }

    async fn establish(
        &self,
        expected_epoch: u64,
        address: Address,
        chain_id: Option<u64>,
    ) -> Result<Option<WalletIdentity>, Error> {
        let mut session = self.session.write().await;
        if session.epoch != expected_epoch {
            return Err(Error::StaleResultDiscarded);
        }

        let unchanged = session.state.connected
            && session.state.address == Some(address)
            && session.state.chain_id == chain_id;
        if unchanged {
            return Ok(session.identity());
        }

        session.state = WalletState {
            connected: true,
            address: Some(address),
            native_balance: Amount::ZERO,
            chain_id,
        };
        session.epoch += 1;
        Ok(session.identity())
    }
}

impl std::fmt::Debug for WalletConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnector")
            .field("has_provider", &self.has_provider())
            .finish()
    }
}
