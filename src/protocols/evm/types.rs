/// EVM-specific types and unit helpers
///
/// Amounts travel through the engine as exact 18-decimal base units. [`Amount`]
/// wraps the raw `U256` and handles decimal parsing and display, so no figure is
/// ever rounded through a float on its way to or from the chain.
use crate::error::Error;
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed decimal exponent of every amount the sale and reward token report
pub const SALE_DECIMALS: u8 = 18;

/// 10^18
pub fn unit_scale() -> U256 {
    U256::from(10u64).pow(U256::from(SALE_DECIMALS))
}

/// A non-negative decimal amount held as 18-decimal base units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    /// Wrap raw base units
    pub const fn from_base_units(raw: U256) -> Self {
        Self(raw)
    }

    /// Whole display units (e.g. `Amount::from_units(150_000)` is 150000.0)
    pub fn from_units(units: u64) -> Self {
        Self(U256::from(units) * unit_scale())
    }

    /// Raw base units
    pub fn base_units(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self - other`, clamped at zero
    pub fn saturating_sub(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Multiply two decimal amounts, truncating below one base unit
    pub fn mul_decimal(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_mul(other.0) / unit_scale())
    }

    /// Render with exactly `places` fractional digits (truncating)
    pub fn to_fixed(&self, places: u8) -> String {
        utils::format_fixed(self.0, SALE_DECIMALS, places)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", utils::format_units(self.0, SALE_DECIMALS))
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        utils::parse_units(s, SALE_DECIMALS).map(Amount)
    }
}

/// Value-transferring transaction handed to the wallet provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sending account
    pub from: Address,
    /// Target contract
    pub to: Address,
    /// Native value in base units
    pub value: U256,
    /// ABI-encoded call data
    pub data: Bytes,
    /// Chain the transaction is built for
    pub chain_id: u64,
}

impl TransactionRequest {
    pub fn new(from: Address, to: Address, chain_id: u64) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: Bytes::new(),
            chain_id,
        }
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }
}

/// Terminal chain state of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceiptSummary {
    pub tx_hash: B256,
    /// `true` when execution succeeded
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    /// Logs emitted by the transaction
    pub logs: Vec<Log>,
    /// Revert reason, when the provider could recover one
    pub revert_reason: Option<String>,
}

/// Unit conversion and display helpers
pub mod utils {
    use super::*;

    /// Parse a decimal string (`"1.5"`) into base units with `decimals` places
    pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, Error> {
        let amount = amount.trim();
        if amount.is_empty() {
            return Err(Error::Config("Empty amount".to_string()));
        }
        let parts: Vec<&str> = amount.split('.').collect();
        if parts.len() > 2 {
            return Err(Error::Config(format!("Invalid number format: {}", amount)));
        }

        let multiplier = U256::from(10u64).pow(U256::from(decimals));
        let whole = if parts[0].is_empty() {
            U256::ZERO
        } else {
            U256::from_str_radix(parts[0], 10)
                .map_err(|e| Error::Config(format!("Invalid whole number '{}': {}", parts[0], e)))?
        };
        let mut result = whole
            .checked_mul(multiplier)
            .ok_or_else(|| Error::Config(format!("Amount too large: {}", amount)))?;

        if parts.len() == 2 && !parts[1].is_empty() {
            let fractional = parts[1];
            if fractional.len() > decimals as usize {
                return Err(Error::Config(format!(
                    "Too many decimal places (max {})",
                    decimals
                )));
            }
            let fractional_value = U256::from_str_radix(fractional, 10).map_err(|e| {
                Error::Config(format!("Invalid fractional part '{}': {}", fractional, e))
            })?;
            let fractional_multiplier =
                U256::from(10u64).pow(U256::from(decimals as usize - fractional.len()));
            result += fractional_value * fractional_multiplier;
        }

        Ok(result)
    }

    /// Render base units as a decimal string without trailing zeros
    pub fn format_units(value: U256, decimals: u8) -> String {
        let divisor = U256::from(10u64).pow(U256::from(decimals));
        let whole = value / divisor;
        let remainder = value % divisor;

        if remainder.is_zero() {
            return whole.to_string();
        }
        let padded = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
        let trimmed = padded.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }

    /// Render base units with exactly `places` fractional digits, truncating the rest
    pub fn format_fixed(value: U256, decimals: u8, places: u8) -> String {
        let divisor = U256::from(10u64).pow(U256::from(decimals));
        let whole = value / divisor;
        if places == 0 {
            return whole.to_string();
        }
        let remainder = value % divisor;
        let padded = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
        let places = (places as usize).min(padded.len());
        format!("{}.{}", whole, &padded[..places])
    }

    /// `0x1234...abcd` form used in headers
    pub fn short_address(address: &Address) -> String {
        let full = format!("{:#x}", address);
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}
