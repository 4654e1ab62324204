//! Two-phase contribution flow
//!
//! `Idle -> Previewed -> Submitting -> Submitted -> Awaiting -> Idle`. Only one
//! contribution can be past `Previewed` at a time; the pending record is visible
//! only while previewed and is cleared exactly once, when the attempt ends.
//! A preview is bound to the wallet session its estimate was computed for.

use alloy_primitives::B256;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::economics::{tier_status, tokens_for_amount};
use super::reader::ChainStateReader;
use super::types::{ContributionOutcome, PendingContribution, TierCatalog};
use crate::error::Error;
use crate::protocols::evm::contracts::{sale::decode_purchase, AvalonSale};
use crate::protocols::evm::types::{Amount, TransactionRequest};
use crate::wallet::{WalletConnector, WalletIdentity};

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlowState {
    Idle,
    Previewed {
        pending: PendingContribution,
        identity: WalletIdentity,
    },
    /// Handed to the wallet, not yet broadcast
    Submitting(PendingContribution),
    Submitted {
        pending: PendingContribution,
        tx_hash: B256,
        sale: alloy_primitives::Address,
    },
    /// A caller is waiting on the receipt
    Awaiting {
        pending: PendingContribution,
        tx_hash: B256,
        sale: alloy_primitives::Address,
    },
}

/// Phase of the flow, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Idle,
    Previewed,
    Submitting,
    Submitted,
    Awaiting,
}

pub struct ContributionFlowController {
    connector: Arc<WalletConnector>,
    reader: Arc<ChainStateReader>,
    catalog: TierCatalog,
    state: Mutex<FlowState>,
}

impl ContributionFlowController {
    pub fn new(
        connector: Arc<WalletConnector>,
        reader: Arc<ChainStateReader>,
        catalog: TierCatalog,
    ) -> Self {
        Self {
            connector,
            reader,
            catalog,
            state: Mutex::new(FlowState::Idle),
        }
    }

    pub async fn phase(&self) -> FlowPhase {
        match *self.state.lock().await {
            FlowState::Idle => FlowPhase::Idle,
            FlowState::Previewed { .. } => FlowPhase::Previewed,
            FlowState::Submitting(_) => FlowPhase::Submitting,
            FlowState::Submitted { .. } => FlowPhase::Submitted,
            FlowState::Awaiting { .. } => FlowPhase::Awaiting,
        }
    }

    /// The previewed contribution awaiting confirmation
    pub async fn pending(&self) -> Option<PendingContribution> {
        match &*self.state.lock().await {
            FlowState::Previewed { pending, .. } => Some(pending.clone()),
            _ => None,
        }
    }

    /// Hash of the broadcast transaction awaiting finality
    pub async fn submitted_tx(&self) -> Option<B256> {
        match &*self.state.lock().await {
            FlowState::Submitted { tx_hash, .. } | FlowState::Awaiting { tx_hash, .. } => {
                Some(*tx_hash)
            }
            _ => None,
        }
    }

    /// Estimate a contribution from the cached snapshot. No chain I/O.
    ///
    /// A missing or zero amount falls back to the minimum contribution.
    pub async fn preview(
        &self,
        tier_id: &str,
        requested_amount: Option<Amount>,
    ) -> Result<PendingContribution, Error> {
        self.ensure_not_in_flight().await?;

        let tier = self
            .catalog
            .get(tier_id)
            .ok_or_else(|| Error::TierNotActive(tier_id.to_string()))?;
        if !tier.live {
            return Err(Error::TierNotActive(tier.name.clone()));
        }

        let snapshot = self
            .reader
            .current_snapshot()
            .await
            .ok_or(Error::NotConnected)?;
        if !tier_status(&snapshot).is_actionable() {
            return Err(Error::TierNotActive(tier.name.clone()));
        }

        let native_amount = requested_amount
            .filter(|amount| !amount.is_zero())
            .unwrap_or(snapshot.min_contribution);
        let pending = PendingContribution {
            tier_id: tier.id.clone(),
            native_amount,
            estimated_reward_amount: tokens_for_amount(native_amount, snapshot.rate),
        };

        let mut state = self.state.lock().await;
        if is_in_flight(&state) {
            return Err(Error::AlreadyInProgress);
        }
        // the session may have moved on since the snapshot was read
        if !self.connector.is_current(&snapshot.identity).await {
            return Err(Error::StaleResultDiscarded);
        }
        *state = FlowState::Previewed {
            pending: pending.clone(),
            identity: snapshot.identity,
        };
        debug!(
            "Previewed {} {} for {} reward units",
            tier.name, pending.native_amount, pending.estimated_reward_amount
        );
        Ok(pending)
    }

    /// Discard the previewed contribution
    pub async fn cancel(&self) -> Result<PendingContribution, Error> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, FlowState::Idle) {
            FlowState::Previewed { pending, .. } => {
                debug!("Preview cancelled");
                Ok(pending)
            }
            FlowState::Idle => Err(Error::NoPendingContribution),
            in_flight => {
                *state = in_flight;
                Err(Error::AlreadyInProgress)
            }
        }
    }

    /// Drop a not-yet-submitted preview. In-flight transactions are kept.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, FlowState::Previewed { .. }) {
            debug!("Dropping previewed contribution");
            *state = FlowState::Idle;
        }
    }

    /// Send `buyTokens()` with the previewed amount as value
    pub async fn confirm_and_submit(&self) -> Result<B256, Error> {
        let (pending, identity) = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, FlowState::Idle) {
                FlowState::Previewed { pending, identity } => {
                    *state = FlowState::Submitting(pending.clone());
                    (pending, identity)
                }
                FlowState::Idle => return Err(Error::NoPendingContribution),
                in_flight => {
                    *state = in_flight;
                    return Err(Error::AlreadyInProgress);
                }
            }
        };

        match self.submit(&pending, &identity).await {
            Ok((tx_hash, sale)) => {
                *self.state.lock().await = FlowState::Submitted {
                    pending,
                    tx_hash,
                    sale,
                };
                info!("Contribution submitted: {:#x}", tx_hash);
                Ok(tx_hash)
            }
            Err(e) => {
                *self.state.lock().await = FlowState::Idle;
                warn!("Contribution not submitted: {}", e);
                Err(e)
            }
        }
    }

    async fn submit(
        &self,
        pending: &PendingContribution,
        previewed_for: &WalletIdentity,
    ) -> Result<(B256, alloy_primitives::Address), Error> {
        let identity = self.connector.identity().await.ok_or(Error::NotConnected)?;
        if identity != *previewed_for {
            warn!(
                "Preview was made for epoch {}, session is now at epoch {}",
                previewed_for.epoch, identity.epoch
            );
            return Err(Error::StaleResultDiscarded);
        }
        let provider = self.connector.provider()?;
        let bindings = self.reader.bindings_for(&identity).await?;

        let request = TransactionRequest::new(identity.address, bindings.sale, identity.chain_id)
            .value(pending.native_amount.base_units())
            .data(AvalonSale::encode_buy_tokens());
        let tx_hash = provider
            .send_transaction(request)
            .await
            .map_err(|e| match Error::from(e) {
                Error::UserRejected => Error::TransactionDeclined,
                other => other,
            })?;
        Ok((tx_hash, bindings.sale))
    }

    /// Wait for the submitted transaction to reach a terminal state.
    ///
    /// On confirmation the snapshot and balance are re-read together and
    /// applied only if both reads succeed. A revert reports
    /// [`Error::ContractRejected`] and leaves cached state alone. A provider
    /// failure while waiting reports [`Error::OutcomeUncertain`] and keeps the
    /// transaction pending so the wait can be retried. Only one caller waits
    /// at a time.
    pub async fn await_finality(&self) -> Result<ContributionOutcome, Error> {
        let (pending, tx_hash, sale) = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, FlowState::Idle) {
                FlowState::Submitted {
                    pending,
                    tx_hash,
                    sale,
                } => {
                    *state = FlowState::Awaiting {
                        pending: pending.clone(),
                        tx_hash,
                        sale,
                    };
                    (pending, tx_hash, sale)
                }
                in_flight @ (FlowState::Submitting(_) | FlowState::Awaiting { .. }) => {
                    *state = in_flight;
                    return Err(Error::AlreadyInProgress);
                }
                other => {
                    *state = other;
                    return Err(Error::NoPendingContribution);
                }
            }
        };

        let waited = match self.connector.provider() {
            Ok(provider) => provider.wait_for_receipt(tx_hash).await.map_err(Error::from),
            Err(e) => Err(e),
        };
        let receipt = match waited {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Lost track of {:#x} while awaiting finality: {}", tx_hash, e);
                *self.state.lock().await = FlowState::Submitted {
                    pending,
                    tx_hash,
                    sale,
                };
                return Err(Error::OutcomeUncertain {
                    tx_hash,
                    message: e.to_string(),
                });
            }
        };

        *self.state.lock().await = FlowState::Idle;

        if !receipt.success {
            let reason = receipt
                .revert_reason
                .clone()
                .unwrap_or_else(|| "execution reverted".to_string());
            warn!("Contribution {:#x} reverted: {}", tx_hash, reason);
            return Err(Error::ContractRejected(reason));
        }

        info!(
            "Contribution {:#x} confirmed in block {:?}",
            tx_hash, receipt.block_number
        );
        let purchase = decode_purchase(&receipt.logs, sale);

        let view_refreshed = match self.connector.identity().await {
            Some(identity) => match self.reader.refresh_all(&identity).await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Post-confirmation refresh failed: {}", e);
                    false
                }
            },
            None => false,
        };

        Ok(ContributionOutcome {
            tx_hash,
            contribution: pending,
            block_number: receipt.block_number,
            purchase,
            view_refreshed,
        })
    }

    async fn ensure_not_in_flight(&self) -> Result<(), Error> {
        if is_in_flight(&*self.state.lock().await) {
            Err(Error::AlreadyInProgress)
        } else {
            Ok(())
        }
    }
}

fn is_in_flight(state: &FlowState) -> bool {
    matches!(
        state,
        FlowState::Submitting(_) | FlowState::Submitted { .. } | FlowState::Awaiting { .. }
    )
}
