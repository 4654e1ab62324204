/// EVM JSON-RPC client
///
/// Thin wrapper over an alloy HTTP provider. Failures come back as
/// [`ProviderError`] so JSON-RPC error codes and revert data survive the trip.
use crate::error::Error;
use crate::protocols::evm::tx::FeeEstimate;
use crate::protocols::evm::types::TxReceiptSummary;
use crate::wallet::provider::ProviderError;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::{Revert, SolError};
use alloy_transport::TransportError;
use alloy_transport_http::{Client, Http};
use tracing::debug;

/// EVM client bound to one endpoint
#[derive(Clone)]
pub struct EvmClient {
    provider: alloy_provider::RootProvider<Http<Client>>,
    rpc_url: String,
    /// Chain the endpoint is expected to serve
    chain_id: u64,
}

impl std::fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmClient")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl EvmClient {
    /// Create a new EVM client with the given RPC endpoint and chain ID
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self, Error> {
        let url = reqwest::Url::parse(rpc_url)
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
            chain_id,
        })
    }

    /// Configured chain ID
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Execute a read-only call (`eth_call`)
    pub async fn call(
        &self,
        from: Option<Address>,
        to: Address,
        data: Bytes,
        value: Option<U256>,
    ) -> Result<Bytes, ProviderError> {
        let tx_request = TransactionRequest {
            from,
            to: Some(TxKind::Call(to)),
            value,
            input: data.into(),
            ..Default::default()
        };

        self.provider.call(&tx_request).await.map_err(rpc_error)
    }

    /// Chain ID reported by the node
    pub async fn get_chain_id(&self) -> Result<u64, ProviderError> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        self.provider.get_balance(address).await.map_err(rpc_error)
    }

    pub async fn get_transaction_count(&self, address: Address) -> Result<u64, ProviderError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(rpc_error)
    }

    /// Estimate gas for a value-bearing call. Reverts surface here with their reason.
    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<u64, ProviderError> {
        let tx_request = TransactionRequest {
            from: Some(from),
            to: Some(TxKind::Call(to)),
            value: Some(value),
            input: data.into(),
            ..Default::default()
        };

        let gas = self
            .provider
            .estimate_gas(&tx_request)
            .await
            .map_err(rpc_error)?;
        Ok(u64::try_from(gas).unwrap_or(u64::MAX))
    }

    /// EIP-1559 fee data, falling back to the legacy gas price
    pub async fn get_fee_data(&self) -> Result<FeeEstimate, ProviderError> {
        match self.provider.estimate_eip1559_fees(None).await {
            Ok(estimate) => Ok(FeeEstimate {
                max_fee_per_gas: estimate.max_fee_per_gas,
                max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
            }),
            Err(e) => {
                debug!("EIP-1559 fee estimation failed, using gas price: {}", e);
                let gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
                Ok(FeeEstimate {
                    max_fee_per_gas: gas_price,
                    max_priority_fee_per_gas: gas_price / 10,
                })
            }
        }
    }

    /// Submit a signed transaction (`eth_sendRawTransaction`)
    pub async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, ProviderError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(rpc_error)?;
        Ok(*pending.tx_hash())
    }

    /// Receipt of a mined transaction, or `None` while pending
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TxReceiptSummary>, ProviderError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(rpc_error)?;

        Ok(receipt.map(|receipt| TxReceiptSummary {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            block_number: receipt.block_number,
            gas_used: u64::try_from(receipt.gas_used).ok(),
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
            revert_reason: None,
        }))
    }
}

/// Convert a transport failure into an EIP-1193 shaped error.
///
/// JSON-RPC error responses keep their code; `Error(string)` revert data is
/// decoded into a plain reason.
pub fn rpc_error(err: TransportError) -> ProviderError {
    if let Some(payload) = err.as_error_resp() {
        let mut provider_err = ProviderError::new(payload.code, payload.message.to_string());
        if let Some(reason) = payload
            .data
            .as_ref()
            .and_then(|data| decode_revert_data(data.get()))
        {
            provider_err = provider_err.with_data(reason);
        }
        return provider_err;
    }
    ProviderError::internal(err.to_string())
}

/// Decode `Error(string)` revert data given as a (possibly JSON-quoted) hex string
pub fn decode_revert_data(data: &str) -> Option<String> {
    let hex_str = data.trim().trim_matches('"');
    let bytes = hex::decode(hex_str.trim_start_matches("0x")).ok()?;
    Revert::abi_decode(&bytes, false)
        .ok()
        .map(|revert| revert.reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_revert_data() {
        let encoded = Revert {
            reason: "Hard cap reached".to_string(),
        }
        .abi_encode();
        let quoted = format!("\"0x{}\"", hex::encode(encoded));
        assert_eq!(
            decode_revert_data(&quoted).as_deref(),
            Some("Hard cap reached")
        );
        assert!(decode_revert_data("\"0xdeadbeef\"").is_none());
        assert!(decode_revert_data("not hex").is_none());
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(EvmClient::new("not a url", 1).is_err());
        let client = EvmClient::new("http://localhost:8545", 31337).unwrap();
        assert_eq!(client.chain_id(), 31337);
        assert_eq!(client.rpc_url(), "http://localhost:8545");
    }
}
