//! CREATE2 salt normalization.
//!
//! Salts arrive as decimal strings, hex strings or numbers. Surrounding whitespace is dropped,
//! then hex input is kept verbatim and everything else is rendered as a `0x`-prefixed,
//! zero-padded 32-byte big-endian word.

use ethers::types::U256;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SaltError {
    #[error("invalid hex salt '{0}'")]
    InvalidHex(String),

    #[error("hex salt '{0}' does not fit in uint256")]
    TooWide(String),

    #[error("invalid decimal salt '{0}'")]
    InvalidDecimal(String),

    #[error("test salts must differ (both are {0})")]
    Indistinct(String),
}

/// A normalized salt: the canonical string plus its uint256 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt {
    canonical: String,
    value: U256,
}

impl Salt {
    pub fn zero() -> Self {
        Self::from(U256::zero())
    }

    /// 32 random bytes from the OS RNG.
    pub fn random() -> Self {
        let mut buf = [0u8; 32];
        OsRng.fill_bytes(&mut buf);
        Self::from(U256::from_big_endian(&buf))
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn value(&self) -> U256 {
        self.value
    }
}

impl FromStr for Salt {
    type Err = SaltError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if s.is_empty() {
            return Ok(Self::zero());
        }

        if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(SaltError::InvalidHex(s.to_string()));
            }
            if digits.len() > 64 {
                return Err(SaltError::TooWide(s.to_string()));
            }
            let value = if digits.is_empty() {
                U256::zero()
            } else {
                U256::from_str_radix(digits, 16).map_err(|_| SaltError::InvalidHex(s.to_string()))?
            };
            return Ok(Self {
                canonical: s.to_string(),
                value,
            });
        }

        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SaltError::InvalidDecimal(s.to_string()));
        }
        let value = U256::from_dec_str(s).map_err(|_| SaltError::InvalidDecimal(s.to_string()))?;
        Ok(Self::from(value))
    }
}

impl From<U256> for Salt {
    fn from(value: U256) -> Self {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        Self {
            canonical: format!("0x{}", hex::encode(buf)),
            value,
        }
    }
}

impl From<u64> for Salt {
    fn from(value: u64) -> Self {
        Self::from(U256::from(value))
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Normalize a raw salt string to its canonical form.
pub fn normalize_salt(raw: &str) -> Result<String, SaltError> {
    raw.parse::<Salt>().map(|s| s.canonical)
}
