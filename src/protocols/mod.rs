/// Protocol modules for the AVALON sale SDK
///
/// - [`evm`]: JSON-RPC client, EIP-1559 transactions and contract bindings
/// - [`sale`]: the sale engine built on top of them
pub mod evm;
pub mod sale;
