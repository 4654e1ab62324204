//! Wallet side of the engine: provider boundary, connection lifecycle and the
//! local JSON-RPC wallet used by the command line front-end.

pub mod connector;
pub mod local;
pub mod provider;
pub mod rpc;

pub use connector::{WalletConnector, WalletIdentity, WalletState};
pub use local::LocalSigner;
pub use provider::{EventEmitter, ProviderError, ProviderEvent, WalletProvider};
pub use rpc::RpcWalletProvider;
