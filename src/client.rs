/// AVALON sale client
///
/// Ties the wallet connector, the chain reader and the contribution flow
/// together, processes provider notifications in order, and publishes an
/// [`EngineView`] after every transition.
use alloy_primitives::{Address, B256};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{network_name, DeploymentRegistry, SaleConfig};
use crate::error::Error;
use crate::protocols::evm::types::{utils::short_address, Amount};
use crate::protocols::sale::economics::derive_tier_views;
use crate::protocols::sale::{
    ChainStateReader, ContributionFlowController, ContributionOutcome, DerivedView,
    PendingContribution, TierCatalog,
};
use crate::wallet::{
    ProviderEvent, RpcWalletProvider, WalletConnector, WalletIdentity, WalletProvider, WalletState,
};

/// Places shown for the native balance
const BALANCE_DISPLAY_PLACES: u8 = 4;

const DEFAULT_NATIVE_SYMBOL: &str = "ETH";
const DEFAULT_REWARD_SYMBOL: &str = "AVALON";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Latest message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Notice for `err`, `None` for discarded stale results
    pub fn from_error(err: &Error) -> Option<Self> {
        let level = if err.is_uncertain() {
            NoticeLevel::Warning
        } else {
            NoticeLevel::Error
        };
        err.notice().map(|message| Self::new(level, message))
    }
}

/// Read-only presentation snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineView {
    pub wallet: WalletState,
    pub network_name: Option<String>,
    pub short_address: Option<String>,
    pub balance_display: String,
    pub native_symbol: String,
    pub reward_balance: Option<Amount>,
    pub connect_label: String,
    pub tiers: Vec<DerivedView>,
    /// Previewed contribution awaiting confirmation
    pub pending: Option<PendingContribution>,
    /// Broadcast transaction awaiting finality
    pub pending_tx: Option<B256>,
    pub notice: Option<Notice>,
}

impl EngineView {
    fn build(
        wallet: WalletState,
        native_symbol: String,
        reward_balance: Option<Amount>,
        tiers: Vec<DerivedView>,
        pending: Option<PendingContribution>,
        pending_tx: Option<B256>,
        notice: Option<Notice>,
    ) -> Self {
        let connect_label = if wallet.connected {
            "Wallet Connected"
        } else {
            "Connect Wallet"
        };
        Self {
            network_name: wallet.chain_id.map(network_name),
            short_address: wallet.address.as_ref().map(short_address),
            balance_display: format!(
                "{} {}",
                wallet.native_balance.to_fixed(BALANCE_DISPLAY_PLACES),
                native_symbol
            ),
            native_symbol,
            reward_balance,
            connect_label: connect_label.to_string(),
            tiers,
            pending,
            pending_tx,
            notice,
            wallet,
        }
    }
}

/// Entry point for driving the sale
pub struct SaleClient {
    config: SaleConfig,
    catalog: TierCatalog,
    connector: Arc<WalletConnector>,
    reader: Arc<ChainStateReader>,
    flow: ContributionFlowController,
    notice: RwLock<Option<Notice>>,
    view_tx: watch::Sender<EngineView>,
}

impl SaleClient {
    pub fn new(
        config: SaleConfig,
        provider: Option<Arc<dyn WalletProvider>>,
        deployments: DeploymentRegistry,
        catalog: TierCatalog,
    ) -> Self {
        let connector = Arc::new(WalletConnector::new(provider));
        let reader = Arc::new(ChainStateReader::new(connector.clone(), deployments));
        let flow = ContributionFlowController::new(connector.clone(), reader.clone(), catalog.clone());

        let initial = EngineView::build(
            WalletState::disconnected(),
            DEFAULT_NATIVE_SYMBOL.to_string(),
            None,
            derive_tier_views(&catalog, None, DEFAULT_NATIVE_SYMBOL),
            None,
            None,
            None,
        );
        let (view_tx, _) = watch::channel(initial);

        Self {
            config,
            catalog,
            connector,
            reader,
            flow,
            notice: RwLock::new(None),
            view_tx,
        }
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    pub fn connector(&self) -> &Arc<WalletConnector> {
        &self.connector
    }

    pub fn reader(&self) -> &Arc<ChainStateReader> {
        &self.reader
    }

    pub fn flow(&self) -> &ContributionFlowController {
        &self.flow
    }

    /// Last published view
    pub fn view(&self) -> EngineView {
        self.view_tx.borrow().clone()
    }

    /// Receiver notified on every republish
    pub fn subscribe_view(&self) -> watch::Receiver<EngineView> {
        self.view_tx.subscribe()
    }

    // ============ Wallet lifecycle ============

    /// Adopt an already-authorized account, then load its state. Never prompts.
    pub async fn probe(&self) -> Option<WalletIdentity> {
        let before = self.connector.epoch().await;
        let identity = self.connector.probe_existing_connection().await;
        self.after_transition(before).await;

        if let Some(identity) = identity {
            if let Err(e) = self.load_for(identity).await {
                self.set_notice(Notice::from_error(&e)).await;
            }
        }
        self.publish().await;
        identity
    }

    /// Prompt the wallet for access and load the connected account
    pub async fn connect(&self) -> Result<WalletIdentity, Error> {
        let before = self.connector.epoch().await;
        let result = self.connector.request_connection().await;
        self.after_transition(before).await;

        let result = match result {
            Ok(identity) => {
                self.set_notice(None).await;
                self.load_for(identity).await.map(|_| identity)
            }
            Err(e) => Err(e),
        };
        self.report(result).await
    }

    /// Re-read balance and sale figures for the live session
    pub async fn refresh(&self) -> Result<(), Error> {
        let result = match self.connector.identity().await {
            Some(identity) => self.load_for(identity).await,
            None => Err(Error::NotConnected),
        };
        self.report(result).await
    }

    /// Account list reported by the provider
    pub async fn on_accounts_changed(&self, accounts: &[Address]) {
        let before = self.connector.epoch().await;
        let identity = self.connector.on_accounts_changed(accounts).await;
        self.after_transition(before).await;

        if let Some(identity) = identity {
            if let Err(e) = self.load_for(identity).await {
                self.set_notice(Notice::from_error(&e)).await;
            }
        }
        self.publish().await;
    }

    /// Chain switch: drop all local state, as on a restart, and re-probe
    pub async fn on_network_changed(&self, chain_id: u64) {
        info!("Network changed to {} ({})", network_name(chain_id), chain_id);
        self.connector.reset().await;
        self.reader.clear().await;
        self.flow.reset().await;
        self.set_notice(None).await;
        self.probe().await;
    }

    pub async fn handle_provider_event(&self, event: ProviderEvent) {
        debug!("Provider event: {:?}", event);
        match event {
            ProviderEvent::AccountsChanged(accounts) => self.on_accounts_changed(&accounts).await,
            ProviderEvent::ChainChanged(chain_id) => self.on_network_changed(chain_id).await,
        }
    }

    /// Process notifications one at a time until the provider drops the channel
    pub async fn run_event_loop(&self, mut events: mpsc::UnboundedReceiver<ProviderEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_provider_event(event).await;
        }
        debug!("Provider event channel closed");
    }

    /// Subscribe to the provider and run the event loop on a background task
    pub fn spawn_event_loop(self: &Arc<Self>) -> Result<JoinHandle<()>, Error> {
        let events = self.connector.provider()?.subscribe();
        let client = Arc::clone(self);
        Ok(tokio::spawn(async move {
            client.run_event_loop(events).await;
        }))
    }

    // ============ Contribution flow ============

    pub async fn preview(
        &self,
        tier_id: &str,
        requested_amount: Option<Amount>,
    ) -> Result<PendingContribution, Error> {
        let result = self.flow.preview(tier_id, requested_amount).await;
        self.report(result).await
    }

    pub async fn cancel(&self) -> Result<PendingContribution, Error> {
        let result = self.flow.cancel().await;
        self.report(result).await
    }

    pub async fn confirm_and_submit(&self) -> Result<B256, Error> {
        let result = self.flow.confirm_and_submit().await;
        if let Ok(tx_hash) = &result {
            self.set_notice(Some(Notice::new(
                NoticeLevel::Info,
                format!("Contribution submitted: {:#x}", tx_hash),
            )))
            .await;
        }
        self.report(result).await
    }

    pub async fn await_finality(&self) -> Result<ContributionOutcome, Error> {
        let result = self.flow.await_finality().await;
        if let Ok(outcome) = &result {
            let reward = outcome
                .purchase
                .as_ref()
                .map(|purchase| purchase.reward_amount_out)
                .unwrap_or(outcome.contribution.estimated_reward_amount);
            let reward_asset = self
                .catalog
                .get(&outcome.contribution.tier_id)
                .map(|tier| tier.reward_asset.clone())
                .unwrap_or_else(|| DEFAULT_REWARD_SYMBOL.to_string());
            self.set_notice(Some(Notice::new(
                NoticeLevel::Success,
                format!(
                    "Contribution confirmed: {} {} for {} {}",
                    outcome.contribution.native_amount,
                    self.native_symbol().await,
                    reward,
                    reward_asset
                ),
            )))
            .await;
        }
        self.report(result).await
    }

    // ============ Internals ============

    /// Reader refresh for `identity`; a superseded result is dropped silently
    async fn load_for(&self, identity: WalletIdentity) -> Result<(), Error> {
        match self.reader.refresh(&identity).await {
            Ok(_) => Ok(()),
            Err(Error::StaleResultDiscarded) => {
                debug!("Refresh for epoch {} superseded", identity.epoch);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop session-bound state when the connector moved to a new epoch
    async fn after_transition(&self, epoch_before: u64) {
        if self.connector.epoch().await != epoch_before {
            self.reader.clear().await;
            self.flow.reset().await;
        }
    }

    async fn report<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(e) = &result {
            match Notice::from_error(e) {
                Some(notice) => {
                    warn!("{}", e);
                    self.set_notice(Some(notice)).await;
                }
                None => debug!("{}", e),
            }
        }
        self.publish().await;
        result
    }

    async fn set_notice(&self, notice: Option<Notice>) {
        *self.notice.write().await = notice;
    }

    async fn native_symbol(&self) -> String {
        let chain_id = self.connector.state().await.chain_id;
        chain_id
            .and_then(|chain_id| self.reader.deployments().get(chain_id))
            .map(|deployment| deployment.native_symbol.clone())
            .unwrap_or_else(|| DEFAULT_NATIVE_SYMBOL.to_string())
    }

    /// Rebuild the view from current state and republish it
    pub async fn publish(&self) -> EngineView {
        let wallet = self.connector.state().await;
        let native_symbol = self.native_symbol().await;
        let snapshot = self.reader.current_snapshot().await;
        let tiers = derive_tier_views(&self.catalog, snapshot.as_ref(), &native_symbol);

        let view = EngineView::build(
            wallet,
            native_symbol,
            snapshot.as_ref().map(|snapshot| snapshot.reward_balance),
            tiers,
            self.flow.pending().await,
            self.flow.submitted_tx().await,
            self.notice.read().await.clone(),
        );
        self.view_tx.send_replace(view.clone());
        view
    }
}

impl std::fmt::Debug for SaleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleClient")
            .field("chain_id", &self.config.chain_id)
            .field("rpc_url", &self.config.rpc_url)
            .field("connector", &self.connector)
            .finish()
    }
}

/// Builder pattern for SaleClient construction
pub struct SaleClientBuilder {
    config: Option<SaleConfig>,
    provider: Option<Arc<dyn WalletProvider>>,
    without_provider: bool,
    deployments: Option<DeploymentRegistry>,
    catalog: Option<TierCatalog>,
}

impl SaleClientBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            provider: None,
            without_provider: false,
            deployments: None,
            catalog: None,
        }
    }

    pub fn with_config(mut self, config: SaleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `provider` instead of the JSON-RPC provider built from config
    pub fn with_provider(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.provider = Some(provider);
        self.without_provider = false;
        self
    }

    /// Run with no wallet provider at all
    pub fn without_provider(mut self) -> Self {
        self.provider = None;
        self.without_provider = true;
        self
    }

    /// Override the deployments from config
    pub fn with_deployments(mut self, deployments: DeploymentRegistry) -> Self {
        self.deployments = Some(deployments);
        self
    }

    pub fn with_catalog(mut self, catalog: TierCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> Result<SaleClient, Error> {
        let config = self.config.unwrap_or_default();
        let deployments = self
            .deployments
            .unwrap_or_else(|| config.deployments.clone());

        let provider = match (self.provider, self.without_provider) {
            (Some(provider), _) => Some(provider),
            (None, true) => None,
            (None, false) => {
                let rpc: Arc<dyn WalletProvider> = Arc::new(RpcWalletProvider::from_config(&config)?);
                Some(rpc)
            }
        };

        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => {
                let reward_symbol = deployments
                    .get(config.chain_id)
                    .map(|deployment| deployment.reward_symbol.clone())
                    .unwrap_or_else(|| DEFAULT_REWARD_SYMBOL.to_string());
                TierCatalog::avalon(&config.live_tier, &reward_symbol)
            }
        };

        Ok(SaleClient::new(config, provider, deployments, catalog))
    }

    /// Build from files and environment when no config was given
    pub fn build_auto(self) -> Result<SaleClient, Error> {
        if self.config.is_some() {
            return self.build();
        }
        let config = SaleConfig::load()?;
        self.with_config(config).build()
    }
}

impl Default for SaleClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
