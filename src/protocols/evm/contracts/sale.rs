/// AVALON sale contract bindings
///
/// Read calls return 18-decimal base units. `buyTokens()` is payable: the
/// contribution travels as the transaction value.
use crate::error::Error;
use crate::protocols::evm::types::Amount;
use crate::wallet::provider::WalletProvider;
use alloy_primitives::{Address, Bytes, Log, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use serde::Serialize;
use std::sync::Arc;

use super::call_contract;

sol! {
    #[derive(Debug)]
    interface IAvalonSale {
        function rate() external view returns (uint256);
        function hardCap() external view returns (uint256);
        function totalRaised() external view returns (uint256);
        function minContribution() external view returns (uint256);
        function buyTokens() external payable;

        event TokensPurchased(address indexed purchaser, uint256 nativeAmountIn, uint256 rewardAmountOut);
    }
}

/// Decoded `TokensPurchased` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseEvent {
    pub purchaser: Address,
    pub native_amount_in: Amount,
    pub reward_amount_out: Amount,
}

/// Sale contract helper
#[derive(Clone)]
pub struct AvalonSale {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl AvalonSale {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Reward units per one native unit, scaled by 1e18
    pub async fn rate(&self) -> Result<U256, Error> {
        let call = IAvalonSale::rateCall {};
        let result = call_contract(self.provider.as_ref(), self.address, call).await?;
        Ok(result._0)
    }

    pub async fn hard_cap(&self) -> Result<U256, Error> {
        let call = IAvalonSale::hardCapCall {};
        let result = call_contract(self.provider.as_ref(), self.address, call).await?;
        Ok(result._0)
    }

    pub async fn total_raised(&self) -> Result<U256, Error> {
        let call = IAvalonSale::totalRaisedCall {};
        let result = call_contract(self.provider.as_ref(), self.address, call).await?;
        Ok(result._0)
    }

    pub async fn min_contribution(&self) -> Result<U256, Error> {
        let call = IAvalonSale::minContributionCall {};
        let result = call_contract(self.provider.as_ref(), self.address, call).await?;
        Ok(result._0)
    }

    /// Calldata for `buyTokens()`
    pub fn encode_buy_tokens() -> Bytes {
        IAvalonSale::buyTokensCall {}.abi_encode().into()
    }
}

/// Find the `TokensPurchased` event emitted by `sale` among receipt logs
pub fn decode_purchase(logs: &[Log], sale: Address) -> Option<PurchaseEvent> {
    logs.iter()
        .filter(|log| log.address == sale)
        .find_map(|log| IAvalonSale::TokensPurchased::decode_log_data(&log.data, true).ok())
        .map(|event| PurchaseEvent {
            purchaser: event.purchaser,
            native_amount_in: Amount::from_base_units(event.nativeAmountIn),
            reward_amount_out: Amount::from_base_units(event.rewardAmountOut),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_tokens_selector() {
        let data = AvalonSale::encode_buy_tokens();
        assert_eq!(data.len(), 4);
        assert_eq!(&data[..], IAvalonSale::buyTokensCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_decode_purchase_filters_by_address() {
        let sale = Address::repeat_byte(0x5a);
        let buyer = Address::repeat_byte(0xab);
        let event = IAvalonSale::TokensPurchased {
            purchaser: buyer,
            nativeAmountIn: U256::from(10u64).pow(U256::from(18u64)),
            rewardAmountOut: U256::from(1000u64) * U256::from(10u64).pow(U256::from(18u64)),
        };
        let log = Log {
            address: sale,
            data: event.encode_log_data(),
        };

        let decoded = decode_purchase(&[log.clone()], sale).unwrap();
        assert_eq!(decoded.purchaser, buyer);
        assert_eq!(decoded.native_amount_in, Amount::from_units(1));
        assert_eq!(decoded.reward_amount_out, Amount::from_units(1000));

        assert!(decode_purchase(&[log], Address::repeat_byte(0x01)).is_none());
        assert!(decode_purchase(&[], sale).is_none());
    }
}
