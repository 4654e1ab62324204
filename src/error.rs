//! Crate-wide error type
//!
//! Every failure the engine can report funnels through [`Error`]. Each variant maps
//! onto one [`ErrorKind`] of the sale taxonomy and onto exactly one user notice.

use alloy_primitives::B256;
use thiserror::Error;

use crate::wallet::provider::ProviderError;

/// EIP-1193 "user rejected request" code
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC code used by most nodes for `execution reverted`
pub const EXECUTION_REVERTED_CODE: i64 = 3;

const REVERT_MARKER: &str = "execution reverted";

#[derive(Debug, Error)]
pub enum Error {
    #[error("No wallet provider available")]
    ProviderMissing,

    #[error("User rejected the request")]
    UserRejected,

    #[error("User declined the transaction")]
    TransactionDeclined,

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Outcome of transaction {tx_hash:#x} is unknown: {message}")]
    OutcomeUncertain { tx_hash: B256, message: String },

    #[error("Contract rejected the transaction: {0}")]
    ContractRejected(String),

    #[error("A contribution is already in progress")]
    AlreadyInProgress,

    #[error("Read result superseded by a newer wallet session")]
    StaleResultDiscarded,

    #[error("No contribution has been previewed")]
    NoPendingContribution,

    #[error("Tier {0} is not open for contributions")]
    TierNotActive(String),

    #[error("No sale deployment configured for chain {0}")]
    UnsupportedNetwork(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("EVM error: {0}")]
    Evm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Taxonomy bucket an [`Error`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProviderMissing,
    UserRejected,
    NotConnected,
    RpcError,
    ContractRejected,
    AlreadyInProgress,
    StaleResultDiscarded,
    InvalidRequest,
    Configuration,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProviderMissing => ErrorKind::ProviderMissing,
            Error::UserRejected | Error::TransactionDeclined => ErrorKind::UserRejected,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Rpc(_) | Error::OutcomeUncertain { .. } | Error::Evm(_) => ErrorKind::RpcError,
            Error::ContractRejected(_) => ErrorKind::ContractRejected,
            Error::AlreadyInProgress => ErrorKind::AlreadyInProgress,
            Error::StaleResultDiscarded => ErrorKind::StaleResultDiscarded,
            Error::NoPendingContribution | Error::TierNotActive(_) => ErrorKind::InvalidRequest,
            Error::UnsupportedNetwork(_)
            | Error::Config(_)
            | Error::Wallet(_)
            | Error::Io(_)
            | Error::Serialization(_) => ErrorKind::Configuration,
        }
    }

    /// Whether the on-chain outcome of an already broadcast transaction is unknown
    pub fn is_uncertain(&self) -> bool {
        matches!(self, Error::OutcomeUncertain { .. })
    }

    /// Human-readable notice for the presentation layer.
    ///
    /// Returns `None` only for [`Error::StaleResultDiscarded`], which is a
    /// correctness mechanism rather than a user event.
    pub fn notice(&self) -> Option<String> {
        let text = match self {
            Error::ProviderMissing => {
                "No wallet provider was found. Install a wallet (e.g. MetaMask) to continue."
                    .to_string()
            }
            Error::UserRejected => "Please connect your wallet to continue.".to_string(),
            Error::TransactionDeclined => {
                "You declined the transaction. Nothing was sent.".to_string()
            }
            Error::NotConnected => "Please connect your wallet first.".to_string(),
            Error::Rpc(message) => format!(
                "An error occurred while talking to the network. Please try again. ({})",
                message
            ),
            Error::OutcomeUncertain { tx_hash, .. } => format!(
                "Transaction {:#x} was submitted but its outcome could not be confirmed yet. Check your wallet before retrying.",
                tx_hash
            ),
            Error::ContractRejected(reason) => {
                format!("The sale contract rejected your contribution: {}", reason)
            }
            Error::AlreadyInProgress => {
                "A contribution is already being processed. Please wait for it to finish."
                    .to_string()
            }
            Error::StaleResultDiscarded => return None,
            Error::NoPendingContribution => {
                "There is no contribution awaiting confirmation.".to_string()
            }
            Error::TierNotActive(tier) => format!("{} is not open for contributions.", tier),
            Error::UnsupportedNetwork(chain_id) => format!(
                "The sale is not available on {}. Please switch networks.",
                crate::config::networks::network_name(*chain_id)
            ),
            Error::Config(message) => format!("Configuration problem: {}", message),
            Error::Wallet(message) => format!("Wallet problem: {}", message),
            Error::Evm(message) => format!(
                "An error occurred while processing your contribution. Please try again. ({})",
                message
            ),
            Error::Io(e) => format!("Local I/O problem: {}", e),
            Error::Serialization(e) => format!("Malformed data: {}", e),
        };
        Some(text)
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        classify_provider_error(&err)
    }
}

/// Map a provider failure onto the sale error taxonomy.
///
/// `4001` is a declined prompt. A revert (code 3 or an `execution reverted`
/// message) becomes [`Error::ContractRejected`] carrying the reason string when
/// one is present. Everything else is an RPC failure.
pub fn classify_provider_error(err: &ProviderError) -> Error {
    if err.code == USER_REJECTED_CODE {
        return Error::UserRejected;
    }

    let from_message = revert_reason(&err.message);
    if from_message.is_some() || err.code == EXECUTION_REVERTED_CODE {
        let reason = from_message
            .filter(|reason| reason != REVERT_MARKER)
            .or_else(|| err.data.clone().filter(|d| !d.is_empty()))
            .unwrap_or_else(|| REVERT_MARKER.to_string());
        return Error::ContractRejected(reason);
    }

    Error::Rpc(err.message.clone())
}

/// Extract the reason from an `execution reverted[: reason]` message
pub fn revert_reason(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    let start = lower.find(REVERT_MARKER)?;
    let rest = message[start + REVERT_MARKER.len()..]
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .trim();
    if rest.is_empty() {
        Some(REVERT_MARKER.to_string())
    } else {
        Some(rest.to_string())
    }
}
