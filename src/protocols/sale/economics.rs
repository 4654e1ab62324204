//! Pure sale arithmetic
//!
//! Everything here is synchronous and deterministic: the same snapshot always
//! yields the same view. Amounts stay in exact 18-decimal base units throughout.

use alloy_primitives::U256;

use super::types::{
    DerivedView, SaleSnapshot, TierCatalog, TierDefinition, TierStatus, PLACEHOLDER_FIGURE,
};
use crate::protocols::evm::types::Amount;

/// 100.00% expressed in hundredths of a percent
const FULL_PROGRESS: u64 = 10_000;

/// Reward units bought by `native` at `rate`
pub fn tokens_for_amount(native: Amount, rate: Amount) -> Amount {
    native.mul_decimal(rate)
}

/// `max(0, hardCap - totalRaised)`
pub fn remaining_native(snapshot: &SaleSnapshot) -> Amount {
    snapshot.hard_cap.saturating_sub(snapshot.total_raised)
}

pub fn remaining_reward_units(snapshot: &SaleSnapshot) -> Amount {
    tokens_for_amount(remaining_native(snapshot), snapshot.rate)
}

pub fn hard_cap_reward_units(snapshot: &SaleSnapshot) -> Amount {
    tokens_for_amount(snapshot.hard_cap, snapshot.rate)
}

/// Progress in hundredths of a percent, rounded half up and clamped to 0..=10000.
///
/// Any non-zero amount raised reports at least 1 (0.01%).
pub fn progress_hundredths(total_raised: Amount, hard_cap: Amount) -> u64 {
    let total = total_raised.base_units();
    let cap = hard_cap.base_units();
    if cap.is_zero() || total.is_zero() {
        return 0;
    }
    if total >= cap {
        return FULL_PROGRESS;
    }

    let numerator = total
        .saturating_mul(U256::from(2 * FULL_PROGRESS))
        .saturating_add(cap);
    let rounded = numerator / cap.saturating_mul(U256::from(2u64));
    let hundredths = rounded.saturating_to::<u64>().min(FULL_PROGRESS);
    hundredths.max(1)
}

/// Progress rendered with two decimals, e.g. `"0.01"` or `"100.00"`
pub fn progress_percent(total_raised: Amount, hard_cap: Amount) -> String {
    let hundredths = progress_hundredths(total_raised, hard_cap);
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

pub fn tier_status(snapshot: &SaleSnapshot) -> TierStatus {
    if remaining_native(snapshot).is_zero() {
        TierStatus::SoldOut
    } else {
        TierStatus::Active
    }
}

/// Decimal rendering with thousands separators in the whole part
pub fn format_grouped(amount: Amount) -> String {
    let plain = amount.to_string();
    let (whole, fraction) = match plain.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (plain.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    match fraction {
        Some(fraction) => format!("{}.{}", grouped, fraction),
        None => grouped,
    }
}

/// View of the live tier computed from chain figures
pub fn derive_view(tier: &TierDefinition, snapshot: &SaleSnapshot) -> DerivedView {
    let status = tier_status(snapshot);
    let hard_cap_units = hard_cap_reward_units(snapshot);
    let remaining_units = remaining_reward_units(snapshot);

    DerivedView {
        tier_id: tier.id.clone(),
        name: tier.name.clone(),
        reward_asset: tier.reward_asset.clone(),
        min_contribution_display: format!(
            "{} {}",
            snapshot.min_contribution, snapshot.native_symbol
        ),
        tokens_for_min_contribution: Some(tokens_for_amount(
            snapshot.min_contribution,
            snapshot.rate,
        )),
        cap_display: format!(
            "{} {} / {} {}",
            format_grouped(hard_cap_units),
            tier.reward_asset,
            format_grouped(remaining_units),
            tier.reward_asset
        ),
        remaining_reward_units: Some(remaining_units),
        hard_cap_reward_units: Some(hard_cap_units),
        progress_percent: progress_percent(snapshot.total_raised, snapshot.hard_cap),
        status,
        action_label: status.action_label().to_string(),
    }
}

/// View without chain data: `???` figures
pub fn placeholder_view(tier: &TierDefinition, status: TierStatus, native_symbol: &str) -> DerivedView {
    DerivedView {
        tier_id: tier.id.clone(),
        name: tier.name.clone(),
        reward_asset: tier.reward_asset.clone(),
        min_contribution_display: format!("{} {}", PLACEHOLDER_FIGURE, native_symbol),
        tokens_for_min_contribution: None,
        cap_display: format!(
            "{} {} / {} {}",
            PLACEHOLDER_FIGURE, tier.reward_asset, PLACEHOLDER_FIGURE, tier.reward_asset
        ),
        remaining_reward_units: None,
        hard_cap_reward_units: None,
        progress_percent: "0.00".to_string(),
        status,
        action_label: status.action_label().to_string(),
    }
}

/// One view per catalog tier. The live tier uses the snapshot when there is one;
/// every other tier is a permanent `coming_soon` placeholder.
pub fn derive_tier_views(
    catalog: &TierCatalog,
    snapshot: Option<&SaleSnapshot>,
    native_symbol: &str,
) -> Vec<DerivedView> {
    catalog
        .iter()
        .map(|tier| match (tier.live, snapshot) {
            (true, Some(snapshot)) => derive_view(tier, snapshot),
            (true, None) => placeholder_view(tier, TierStatus::Active, native_symbol),
            (false, _) => placeholder_view(tier, TierStatus::ComingSoon, native_symbol),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::WalletIdentity;
    use alloy_primitives::Address;

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn snapshot(rate: &str, hard_cap: &str, total_raised: &str, min: &str) -> SaleSnapshot {
        SaleSnapshot {
            rate: amount(rate),
            hard_cap: amount(hard_cap),
            total_raised: amount(total_raised),
            min_contribution: amount(min),
            reward_balance: Amount::ZERO,
            reward_symbol: "AVALON".to_string(),
            native_symbol: "ETH".to_string(),
            identity: WalletIdentity {
                address: Address::repeat_byte(0xab),
                chain_id: 84532,
                epoch: 1,
            },
        }
    }

    #[test]
    fn test_tokens_for_amount() {
        assert_eq!(tokens_for_amount(amount("1"), amount("1000")), amount("1000"));
        assert_eq!(tokens_for_amount(amount("0.5"), amount("1000")), amount("500"));
        assert_eq!(tokens_for_amount(Amount::ZERO, amount("1000")), Amount::ZERO);
    }

    #[test]
    fn test_tokens_for_amount_is_linear() {
        let rate = amount("1234.567890123456789");
        let samples = ["0", "0.000000000000000001", "1", "2.5", "99.999999", "150000"];
        for a in samples {
            for b in samples {
                let combined = tokens_for_amount(amount(a).saturating_add(amount(b)), rate);
                let separate = tokens_for_amount(amount(a), rate)
                    .saturating_add(tokens_for_amount(amount(b), rate));
                let diff = if combined >= separate {
                    combined.saturating_sub(separate)
                } else {
                    separate.saturating_sub(combined)
                };
                // one truncated base unit per multiplication
                assert!(diff.base_units() <= U256::from(1u64), "{} + {}", a, b);
            }
        }
    }

    #[test]
    fn test_progress_floor_for_tiny_amounts() {
        assert_eq!(progress_percent(amount("1"), amount("1000000")), "0.01");
        assert_eq!(progress_percent(Amount::ZERO, amount("1000000")), "0.00");
    }

    #[test]
    fn test_progress_rounds_half_up_and_clamps() {
        // 1/8 = 12.5% exactly
        assert_eq!(progress_percent(amount("1"), amount("8")), "12.50");
        // 0.00005 of the cap is 0.005% -> rounds up to 0.01
        assert_eq!(progress_percent(amount("5"), amount("100000")), "0.01");
        // 2/3 = 66.666..%
        assert_eq!(progress_percent(amount("2"), amount("3")), "66.67");
        assert_eq!(progress_percent(amount("150"), amount("100")), "100.00");
        assert_eq!(progress_percent(amount("1"), Amount::ZERO), "0.00");
    }

    #[test]
    fn test_sold_out_boundary() {
        let full = snapshot("1000", "100", "100", "1");
        assert_eq!(tier_status(&full), TierStatus::SoldOut);
        let view = derive_view(&TierCatalog::default().live_tier().unwrap().clone(), &full);
        assert_eq!(view.action_label, "Sold Out");
        assert!(!view.status.is_actionable());

        let almost = snapshot("1000", "100", "99.999999", "1");
        assert_eq!(tier_status(&almost), TierStatus::Active);
    }

    #[test]
    fn test_over_raised_clamps_remaining() {
        let over = snapshot("1000", "100", "120", "1");
        assert_eq!(remaining_native(&over), Amount::ZERO);
        assert_eq!(remaining_reward_units(&over), Amount::ZERO);
        assert_eq!(tier_status(&over), TierStatus::SoldOut);
    }

    #[test]
    fn test_live_view_figures() {
        let snap = snapshot("1000", "150000", "1", "1");
        let catalog = TierCatalog::default();
        let views = derive_tier_views(&catalog, Some(&snap), "ETH");

        assert_eq!(views.len(), 3);
        let live = &views[0];
        assert_eq!(live.min_contribution_display, "1 ETH");
        assert_eq!(live.tokens_for_min_contribution, Some(amount("1000")));
        assert_eq!(live.remaining_reward_units, Some(amount("149999000")));
        assert_eq!(
            live.cap_display,
            "150,000,000 AVALON / 149,999,000 AVALON"
        );
        assert_eq!(live.status, TierStatus::Active);

        for placeholder in &views[1..] {
            assert_eq!(placeholder.status, TierStatus::ComingSoon);
            assert_eq!(placeholder.min_contribution_display, "??? ETH");
            assert_eq!(placeholder.cap_display, "??? AVALON / ??? AVALON");
            assert_eq!(placeholder.action_label, "Coming Soon");
        }
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let snap = snapshot("1000", "150000", "42.5", "0.1");
        let catalog = TierCatalog::default();
        assert_eq!(
            derive_tier_views(&catalog, Some(&snap), "ETH"),
            derive_tier_views(&catalog, Some(&snap), "ETH")
        );
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(amount("150000")), "150,000");
        assert_eq!(format_grouped(amount("999")), "999");
        assert_eq!(format_grouped(amount("1234567.25")), "1,234,567.25");
        assert_eq!(format_grouped(Amount::ZERO), "0");
    }
}
