/// EVM support for the AVALON sale
///
/// - Read-only contract calls via `eth_call`
/// - Transaction submission with the EIP-1559 fee market
/// - Sale and ERC-20 contract bindings
/// - Exact 18-decimal amounts
///
/// # Example
///
/// ```rust,no_run
/// use avalon_sale_sdk::protocols::evm::client::EvmClient;
/// use alloy_primitives::address;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = EvmClient::new("https://sepolia.base.org", 84532)?;
/// let balance = client
///     .get_balance(address!("9858effd232b4033e47d90003d41ec34ecaeda94"))
///     .await?;
/// println!("Balance: {}", balance);
/// # Ok(())
/// # }
/// ```
pub mod client;
pub mod contracts;
pub mod tx;
pub mod types;

pub use client::EvmClient;
pub use tx::{Eip1559Transaction, FeeEstimate, SignedEip1559Transaction};
pub use types::{Amount, TransactionRequest, TxReceiptSummary};
