/// ERC-20 token contract helpers
use crate::error::Error;
use crate::wallet::provider::WalletProvider;
use alloy_primitives::{Address, U256};
use alloy_sol_types::sol;
use std::sync::Arc;

use super::call_contract;

sol! {
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
    }
}

/// ERC-20 token helper
#[derive(Clone)]
pub struct Erc20 {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl Erc20 {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    /// Get balance of an address
    pub async fn balance_of(&self, account: Address) -> Result<U256, Error> {
        let call = IERC20::balanceOfCall { account };
        let result = call_contract(self.provider.as_ref(), self.address, call).await?;
        Ok(result._0)
    }

    pub fn address(&self) -> Address {
        self.address
    }
}
