//! Chain reads for the sale
//!
//! [`ChainStateReader`] owns the contract bindings and the cached
//! [`SaleSnapshot`]. Each read is tagged with the [`WalletIdentity`] it was
//! issued for and is dropped on completion if that session is no longer live.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{SaleBindings, SaleSnapshot};
use crate::config::DeploymentRegistry;
use crate::error::Error;
use crate::protocols::evm::contracts::{AvalonSale, Erc20};
use crate::protocols::evm::types::Amount;
use crate::wallet::{WalletConnector, WalletIdentity};

pub struct ChainStateReader {
    connector: Arc<WalletConnector>,
    deployments: DeploymentRegistry,
    bindings: RwLock<Option<SaleBindings>>,
    snapshot: RwLock<Option<SaleSnapshot>>,
}

impl ChainStateReader {
    pub fn new(connector: Arc<WalletConnector>, deployments: DeploymentRegistry) -> Self {
        Self {
            connector,
            deployments,
            bindings: RwLock::new(None),
            snapshot: RwLock::new(None),
        }
    }

    pub fn deployments(&self) -> &DeploymentRegistry {
        &self.deployments
    }

    /// Build bindings for `identity` from the deployment registry
    pub async fn rebuild_bindings(&self, identity: &WalletIdentity) -> Result<SaleBindings, Error> {
        let mut bindings = self.bindings.write().await;
        *bindings = None;

        let deployment = self.deployments.require(identity.chain_id)?;
        let rebuilt = SaleBindings::new(identity, deployment);
        debug!(
            "Rebuilt sale bindings for {:#x} on chain {} (epoch {})",
            identity.address, identity.chain_id, identity.epoch
        );
        *bindings = Some(rebuilt.clone());
        Ok(rebuilt)
    }

    /// Bindings for `identity`, rebuilding them if they belong to another session
    pub async fn bindings_for(&self, identity: &WalletIdentity) -> Result<SaleBindings, Error> {
        if let Some(bindings) = self.bindings.read().await.as_ref() {
            if bindings.matches(identity) {
                return Ok(bindings.clone());
            }
        }
        self.rebuild_bindings(identity).await
    }

    /// Drop bindings and snapshot
    pub async fn clear(&self) {
        *self.bindings.write().await = None;
        *self.snapshot.write().await = None;
    }

    /// The cached snapshot, if it belongs to the live session
    pub async fn current_snapshot(&self) -> Option<SaleSnapshot> {
        let identity = self.connector.identity().await?;
        self.snapshot
            .read()
            .await
            .as_ref()
            .filter(|snapshot| snapshot.identity == identity)
            .cloned()
    }

    pub async fn read_native_balance(&self, identity: &WalletIdentity) -> Result<Amount, Error> {
        let provider = self.connector.provider()?;
        let raw = provider.native_balance(identity.address).await?;
        self.ensure_current(identity).await?;
        Ok(Amount::from_base_units(raw))
    }

    /// Ordered reads: rate, hardCap, totalRaised, minContribution, reward balance.
    ///
    /// The snapshot is stored only when all five succeed and the session is
    /// still the one the read was issued for.
    pub async fn read_sale_snapshot(&self, identity: &WalletIdentity) -> Result<SaleSnapshot, Error> {
        let snapshot = self.fetch_snapshot(identity).await?;
        self.commit(identity, snapshot, None).await
    }

    async fn fetch_snapshot(&self, identity: &WalletIdentity) -> Result<SaleSnapshot, Error> {
        if !self.connector.is_current(identity).await {
            return Err(Error::NotConnected);
        }
        let provider = self.connector.provider()?;
        let bindings = self.bindings_for(identity).await?;

        let sale = AvalonSale::new(provider.clone(), bindings.sale);
        let reward_token = Erc20::new(provider, bindings.reward_token);

        let rate = sale.rate().await?;
        let hard_cap = sale.hard_cap().await?;
        let total_raised = sale.total_raised().await?;
        let min_contribution = sale.min_contribution().await?;
        let reward_balance = reward_token.balance_of(bindings.account).await?;

        Ok(SaleSnapshot {
            rate: Amount::from_base_units(rate),
            hard_cap: Amount::from_base_units(hard_cap),
            total_raised: Amount::from_base_units(total_raised),
            min_contribution: Amount::from_base_units(min_contribution),
            reward_balance: Amount::from_base_units(reward_balance),
            reward_symbol: bindings.reward_symbol.clone(),
            native_symbol: bindings.native_symbol.clone(),
            identity: *identity,
        })
    }

    /// Store `snapshot`, and `balance` when given, if `identity` is still live.
    /// Either both are applied or neither is.
    async fn commit(
        &self,
        identity: &WalletIdentity,
        snapshot: SaleSnapshot,
        balance: Option<Amount>,
    ) -> Result<SaleSnapshot, Error> {
        let mut cached = self.snapshot.write().await;
        self.ensure_current(identity).await?;
        let newer_cached = cached
            .as_ref()
            .map_or(false, |existing| existing.identity.epoch > identity.epoch);
        if newer_cached {
            warn!("Discarding sale snapshot for superseded epoch {}", identity.epoch);
            return Err(Error::StaleResultDiscarded);
        }
        if let Some(balance) = balance {
            self.connector.apply_balance(identity, balance).await?;
        }
        *cached = Some(snapshot.clone());
        debug!(
            "Sale snapshot applied: rate={} hard_cap={} total_raised={}",
            snapshot.rate, snapshot.hard_cap, snapshot.total_raised
        );
        Ok(snapshot)
    }

    /// Balance then snapshot for `identity`.
    ///
    /// A failed balance read keeps the last-known balance; the snapshot result
    /// is returned as is.
    pub async fn refresh(&self, identity: &WalletIdentity) -> Result<SaleSnapshot, Error> {
        match self.read_native_balance(identity).await {
            Ok(balance) => {
                if let Err(e) = self.connector.apply_balance(identity, balance).await {
                    debug!("Balance result not applied: {}", e);
                }
            }
            Err(Error::StaleResultDiscarded) => return Err(Error::StaleResultDiscarded),
            Err(e) => warn!("Native balance read failed, keeping last-known value: {}", e),
        }
        self.read_sale_snapshot(identity).await
    }

    /// Balance and snapshot for `identity`, applied together.
    ///
    /// Nothing is applied unless every read succeeds, so a failure leaves the
    /// last-known balance and snapshot untouched.
    pub async fn refresh_all(&self, identity: &WalletIdentity) -> Result<SaleSnapshot, Error> {
        let balance = self.read_native_balance(identity).await?;
        let snapshot = self.fetch_snapshot(identity).await?;
        self.commit(identity, snapshot, Some(balance)).await
    }

    async fn ensure_current(&self, identity: &WalletIdentity) -> Result<(), Error> {
        if self.connector.is_current(identity).await {
            Ok(())
        } else {
            warn!(
                "Discarding read for superseded session {:#x}/{} (epoch {})",
                identity.address, identity.chain_id, identity.epoch
            );
            Err(Error::StaleResultDiscarded)
        }
    }
}
