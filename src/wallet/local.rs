// Allow deprecated Signature for compatibility with alloy-consensus ecosystem
#![allow(deprecated)]

use alloy_primitives::{Address, Signature, B256};
use bip32::{DerivationPath, Seed, XPrv};
use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use secrecy::{ExposeSecret, SecretString};
use sha3::{digest::FixedOutput, Digest, Keccak256};
use std::str::FromStr;
use zeroize::Zeroize;

use crate::error::Error;
use crate::protocols::evm::tx::{Eip1559Transaction, SignedEip1559Transaction};

/// HD Path for Ethereum chains (BIP-44)
const ETHEREUM_HD_PATH: &str = "m/44'/60'/0'/0/";

/// Locally held secp256k1 key derived from a BIP-39 mnemonic
pub struct LocalSigner {
    signing_key: SigningKey,
    address: Address,
    account_index: u32,
}

// Note: LocalSigner intentionally does not implement Clone

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("account_index", &self.account_index)
            .finish()
    }
}

impl LocalSigner {
    /// Derive the key at `m/44'/60'/0'/0/<account_index>`
    pub fn from_mnemonic(mnemonic: &str, account_index: u32) -> Result<Self, Error> {
        let mnemonic = Mnemonic::from_str(mnemonic)
            .map_err(|e| Error::Wallet(format!("Invalid mnemonic: {}", e)))?;

        let seed = Seed::new(mnemonic.to_seed(""));

        let path = format!("{}{}", ETHEREUM_HD_PATH, account_index);
        let path = DerivationPath::from_str(&path)
            .map_err(|e| Error::Wallet(format!("Invalid Ethereum derivation path: {}", e)))?;

        let derived_key = XPrv::derive_from_path(seed.as_bytes(), &path)
            .map_err(|e| Error::Wallet(format!("Key derivation error: {}", e)))?;

        let mut key_bytes = derived_key.to_bytes();
        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| Error::Wallet(format!("Failed to create EVM signing key: {}", e)));
        key_bytes.zeroize();
        let signing_key = signing_key?;

        let address = ethereum_address(&signing_key)?;
        Ok(Self {
            signing_key,
            address,
            account_index,
        })
    }

    pub fn from_secret(mnemonic: &SecretString, account_index: u32) -> Result<Self, Error> {
        Self::from_mnemonic(mnemonic.expose_secret(), account_index)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    fn sign_with_keccak(&self, payload: &[u8]) -> Result<(Signature, B256), Error> {
        let mut digest = Keccak256::new();
        digest.update(payload);

        let hash_bytes: [u8; 32] = digest.clone().finalize_fixed().into();

        let (sig, recid) = self
            .signing_key
            .sign_digest_recoverable(digest)
            .map_err(|e| Error::Wallet(format!("Failed to sign digest: {}", e)))?;

        Ok((Signature::from((sig, recid)), B256::from(hash_bytes)))
    }

    /// Sign an EIP-1559 transaction and return the full signed payload.
    pub fn sign_eip1559(&self, tx: &Eip1559Transaction) -> Result<SignedEip1559Transaction, Error> {
        let (signature, _) = self.sign_with_keccak(&tx.encoded_for_signing())?;
        let raw = tx.encode_signed(&signature);
        let signed = tx.clone().into_signed(signature);
        Ok(SignedEip1559Transaction::new(signed, raw))
    }
}

/// Keccak-256 of the uncompressed public key, last 20 bytes
fn ethereum_address(signing_key: &SigningKey) -> Result<Address, Error> {
    let point = signing_key.verifying_key().to_encoded_point(false);
    let pubkey_bytes = point.as_bytes();

    if pubkey_bytes.len() != 65 || pubkey_bytes[0] != 0x04 {
        return Err(Error::Wallet(
            "Invalid public key format for Ethereum address derivation".to_string(),
        ));
    }

    let hash = Keccak256::digest(&pubkey_bytes[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_known_derivation() {
        let signer = LocalSigner::from_mnemonic(MNEMONIC, 0).unwrap();
        let expected: Address = "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
            .parse()
            .unwrap();
        assert_eq!(signer.address(), expected);
    }

    #[test]
    fn test_account_index_changes_address() {
        let first = LocalSigner::from_mnemonic(MNEMONIC, 0).unwrap();
        let second = LocalSigner::from_mnemonic(MNEMONIC, 1).unwrap();
        assert_ne!(first.address(), second.address());
        assert_eq!(second.account_index(), 1);
    }

    #[test]
    fn test_invalid_mnemonic() {
        assert!(matches!(
            LocalSigner::from_mnemonic("not a mnemonic", 0),
            Err(Error::Wallet(_))
        ));
    }

    #[test]
    fn test_signature_recovers_signer() {
        let signer = LocalSigner::from_mnemonic(MNEMONIC, 0).unwrap();
        let tx = Eip1559Transaction::new(84532, 0)
            .to(Some(Address::repeat_byte(0x11)))
            .value(U256::from(1u64))
            .gas_limit(60_000)
            .max_fee_per_gas(1_000_000_000)
            .max_priority_fee_per_gas(1_000_000);

        let signed = signer.sign_eip1559(&tx).unwrap();
        let recovered = signed
            .signature()
            .recover_address_from_prehash(&tx.signature_hash())
            .unwrap();
        assert_eq!(recovered, signer.address());
        assert_eq!(signed.raw()[0], 0x02);
    }
}
