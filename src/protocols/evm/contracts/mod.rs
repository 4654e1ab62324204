/// EVM contract interfaces and helpers
///
/// Type-safe interfaces built with the Alloy `sol!` macro. Calls are routed
/// through a [`WalletProvider`] so the same bindings work against any wallet.
///
/// # Available Contracts
///
/// - **AvalonSale**: token sale contract (`rate`, `hardCap`, `buyTokens`, ...)
/// - **ERC-20**: reward token balance reads
pub mod erc20;
pub mod sale;

pub use erc20::{Erc20, IERC20};
pub use sale::{AvalonSale, IAvalonSale, PurchaseEvent};

use crate::error::Error;
use crate::wallet::provider::WalletProvider;
use alloy_primitives::Address;
use alloy_sol_types::SolCall;

/// Execute a read-only contract call and decode its return value
pub async fn call_contract<T: SolCall>(
    provider: &dyn WalletProvider,
    contract_address: Address,
    call: T,
) -> Result<T::Return, Error> {
    let data = call.abi_encode();
    let result = provider.call(contract_address, data.into()).await?;
    T::abi_decode_returns(&result, false)
        .map_err(|e| Error::Evm(format!("Failed to decode contract call result: {}", e)))
}
