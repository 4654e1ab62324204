// Allow deprecated Signature for compatibility with alloy-consensus ecosystem
#![allow(deprecated)]

use alloy_consensus::{SignableTransaction, Signed, TxEip1559};
use alloy_eips::eip2930::AccessList;
use alloy_primitives::{Address, Bytes, ChainId, Signature, TxKind, B256, U256};

use super::types::TransactionRequest;

/// Gas limit of a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Fee parameters for an EIP-1559 transaction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Builder for EIP-1559 transactions signed by the local wallet.
#[derive(Clone, Debug)]
pub struct Eip1559Transaction {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: AccessList,
}

impl Eip1559Transaction {
    /// Create a new transaction with zeroed value, data and fees.
    pub fn new(chain_id: u64, nonce: u64) -> Self {
        Self {
            chain_id,
            nonce,
            gas_limit: TRANSFER_GAS,
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
            to: None,
            value: U256::ZERO,
            data: Bytes::new(),
            access_list: AccessList::default(),
        }
    }

    /// Build from an engine request once nonce, gas and fees are known.
    pub fn from_request(
        request: &TransactionRequest,
        nonce: u64,
        gas_limit: u64,
        fees: FeeEstimate,
    ) -> Self {
        Self::new(request.chain_id, nonce)
            .to(Some(request.to))
            .value(request.value)
            .data(request.data.clone())
            .gas_limit(gas_limit)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
    }

    /// Set the target address (None implies contract creation).
    pub fn to(mut self, to: Option<Address>) -> Self {
        self.to = to;
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn max_fee_per_gas(mut self, max_fee: u128) -> Self {
        self.max_fee_per_gas = max_fee;
        self
    }

    pub fn max_priority_fee_per_gas(mut self, tip: u128) -> Self {
        self.max_priority_fee_per_gas = tip;
        self
    }

    fn to_kind(&self) -> TxKind {
        self.to.map(TxKind::Call).unwrap_or(TxKind::Create)
    }

    fn to_alloy(&self) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            to: self.to_kind(),
            value: self.value,
            access_list: self.access_list.clone(),
            input: self.data.clone(),
        }
    }

    /// Bytes that are hashed (keccak256) for signing.
    pub fn encoded_for_signing(&self) -> Vec<u8> {
        self.to_alloy().encoded_for_signing()
    }

    pub fn signature_hash(&self) -> B256 {
        self.to_alloy().signature_hash()
    }

    /// Encode the signed transaction for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, signature: &Signature) -> Bytes {
        let tx = self.to_alloy();
        let mut buf = Vec::with_capacity(tx.encoded_len_with_signature(signature, false));
        tx.encode_with_signature(signature, &mut buf, false);
        Bytes::from(buf)
    }

    pub fn into_signed(self, signature: Signature) -> Signed<TxEip1559> {
        self.to_alloy().into_signed(signature)
    }
}

/// Signed transaction plus its raw payload.
#[derive(Clone, Debug)]
pub struct SignedEip1559Transaction {
    signed: Signed<TxEip1559>,
    raw: Bytes,
}

impl SignedEip1559Transaction {
    pub fn new(signed: Signed<TxEip1559>, raw: Bytes) -> Self {
        Self { signed, raw }
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Transaction hash computed from the signed payload.
    pub fn hash(&self) -> B256 {
        *self.signed.hash()
    }

    pub fn signature(&self) -> &Signature {
        self.signed.signature()
    }

    pub fn into_raw(self) -> Bytes {
        self.raw
    }
}
