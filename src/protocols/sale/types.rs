use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SaleDeployment;
use crate::protocols::evm::types::Amount;
use crate::wallet::WalletIdentity;

/// Figure shown for tiers without live data
pub const PLACEHOLDER_FIGURE: &str = "???";

/// Display status of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStatus {
    Active,
    ComingSoon,
    SoldOut,
}

impl TierStatus {
    pub fn action_label(&self) -> &'static str {
        match self {
            TierStatus::Active => "Contribute Now",
            TierStatus::ComingSoon => "Coming Soon",
            TierStatus::SoldOut => "Sold Out",
        }
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, TierStatus::Active)
    }
}

impl fmt::Display for TierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TierStatus::Active => "active",
            TierStatus::ComingSoon => "coming_soon",
            TierStatus::SoldOut => "sold_out",
        };
        write!(f, "{}", s)
    }
}

/// Static description of a sale tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDefinition {
    pub id: String,
    pub name: String,
    pub reward_asset: String,
    /// Only the live tier is backed by chain data
    pub live: bool,
}

/// The tiers on offer, in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCatalog {
    tiers: Vec<TierDefinition>,
}

impl TierCatalog {
    pub fn new(tiers: Vec<TierDefinition>) -> Self {
        Self { tiers }
    }

    /// Tranches A, B and C, with `live_tier` backed by the sale contract
    pub fn avalon(live_tier: &str, reward_asset: &str) -> Self {
        let tiers = ["A", "B", "C"]
            .iter()
            .map(|id| TierDefinition {
                id: id.to_string(),
                name: format!("Tranche {}", id),
                reward_asset: reward_asset.to_string(),
                live: id.eq_ignore_ascii_case(live_tier),
            })
            .collect();
        Self { tiers }
    }

    pub fn get(&self, tier_id: &str) -> Option<&TierDefinition> {
        self.tiers
            .iter()
            .find(|tier| tier.id.eq_ignore_ascii_case(tier_id))
    }

    pub fn live_tier(&self) -> Option<&TierDefinition> {
        self.tiers.iter().find(|tier| tier.live)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self::avalon("A", "AVALON")
    }
}

/// Contract handles built for exactly one wallet identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleBindings {
    pub sale: Address,
    pub reward_token: Address,
    pub account: Address,
    pub chain_id: u64,
    pub epoch: u64,
    pub reward_symbol: String,
    pub native_symbol: String,
}

impl SaleBindings {
    pub fn new(identity: &WalletIdentity, deployment: &SaleDeployment) -> Self {
        Self {
            sale: deployment.sale,
            reward_token: deployment.reward_token,
            account: identity.address,
            chain_id: identity.chain_id,
            epoch: identity.epoch,
            reward_symbol: deployment.reward_symbol.clone(),
            native_symbol: deployment.native_symbol.clone(),
        }
    }

    pub fn identity(&self) -> WalletIdentity {
        WalletIdentity {
            address: self.account,
            chain_id: self.chain_id,
            epoch: self.epoch,
        }
    }

    pub fn matches(&self, identity: &WalletIdentity) -> bool {
        self.identity() == *identity
    }
}

/// On-chain sale figures, replaced as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaleSnapshot {
    /// Reward units per one native unit
    pub rate: Amount,
    pub hard_cap: Amount,
    pub total_raised: Amount,
    pub min_contribution: Amount,
    /// Reward-token balance of the connected account
    pub reward_balance: Amount,
    pub reward_symbol: String,
    pub native_symbol: String,
    /// Session the figures were read for
    pub identity: WalletIdentity,
}

/// Display and decision values for one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedView {
    pub tier_id: String,
    pub name: String,
    pub reward_asset: String,
    pub min_contribution_display: String,
    pub tokens_for_min_contribution: Option<Amount>,
    /// `<hard cap> / <available>` in reward units
    pub cap_display: String,
    pub remaining_reward_units: Option<Amount>,
    pub hard_cap_reward_units: Option<Amount>,
    pub progress_percent: String,
    pub status: TierStatus,
    pub action_label: String,
}

/// A previewed contribution awaiting confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingContribution {
    pub tier_id: String,
    pub native_amount: Amount,
    pub estimated_reward_amount: Amount,
}

/// A confirmed contribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributionOutcome {
    pub tx_hash: B256,
    pub contribution: PendingContribution,
    pub block_number: Option<u64>,
    /// Amounts reported by the `TokensPurchased` event, when it was found
    pub purchase: Option<crate::protocols::evm::contracts::PurchaseEvent>,
    /// `false` when the post-confirmation refresh failed and the view is behind
    pub view_refreshed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avalon_catalog() {
        let catalog = TierCatalog::default();
        let names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Tranche A", "Tranche B", "Tranche C"]);
        assert_eq!(catalog.live_tier().map(|t| t.id.as_str()), Some("A"));
        assert!(!catalog.get("b").unwrap().live);
        assert!(catalog.get("D").is_none());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(TierStatus::Active.action_label(), "Contribute Now");
        assert_eq!(TierStatus::SoldOut.action_label(), "Sold Out");
        assert_eq!(TierStatus::ComingSoon.action_label(), "Coming Soon");
        assert!(!TierStatus::SoldOut.is_actionable());
        assert_eq!(TierStatus::ComingSoon.to_string(), "coming_soon");
    }

    #[test]
    fn test_bindings_match_only_their_identity() {
        let identity = WalletIdentity {
            address: Address::repeat_byte(0xab),
            chain_id: 84532,
            epoch: 3,
        };
        let deployment =
            SaleDeployment::new(84532, Address::repeat_byte(0x11), Address::repeat_byte(0x22));
        let bindings = SaleBindings::new(&identity, &deployment);

        assert!(bindings.matches(&identity));
        assert!(!bindings.matches(&WalletIdentity { epoch: 4, ..identity }));
        assert_eq!(bindings.reward_symbol, "AVALON");
    }
}
