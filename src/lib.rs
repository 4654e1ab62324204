pub mod client;
pub mod config;
pub mod error;
pub mod protocols;
pub mod wallet;

// Main client exports
pub use client::{EngineView, Notice, NoticeLevel, SaleClient, SaleClientBuilder};
pub use config::{network_name, DeploymentRegistry, EnvironmentConfig, SaleConfig, SaleDeployment};
pub use error::{Error, ErrorKind};

// Wallet exports
pub use wallet::{
    LocalSigner, ProviderError, ProviderEvent, RpcWalletProvider, WalletConnector,
    WalletIdentity, WalletProvider, WalletState,
};

// Sale engine exports
pub use protocols::sale::{
    ChainStateReader, ContributionFlowController, ContributionOutcome, DerivedView, FlowPhase,
    PendingContribution, SaleBindings, SaleSnapshot, TierCatalog, TierDefinition, TierStatus,
};

// EVM exports
pub use protocols::evm::contracts::PurchaseEvent;
pub use protocols::evm::types::{Amount, TransactionRequest, TxReceiptSummary};

// Re-export common primitives
pub use alloy_primitives::{Address, B256, U256};
