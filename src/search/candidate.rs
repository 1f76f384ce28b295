//! Wallet, salt and candidate values.

use std::fmt;
use std::sync::Arc;

use crate::crypto::Address;
use crate::matcher::Score;

/// Bytes of the salt reserved for the wallet.
pub const WALLET_PREFIX_LEN: usize = 20;
/// Bytes of the salt chosen by the salt policy.
pub const NONCE_LEN: usize = 32 - WALLET_PREFIX_LEN;

/// The fixed identifier every candidate address is derived from.
///
/// Cheap to clone; all search units share the same bytes read-only.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Wallet(Arc<[u8]>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("wallet cannot be empty")]
    Empty,
    #[error("wallet is not valid hex: {0}")]
    InvalidHex(String),
}

impl Wallet {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, WalletError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(WalletError::Empty);
        }
        Ok(Self(bytes.into()))
    }

    /// Parses hex with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        let h = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(h).map_err(|e| WalletError::InvalidHex(e.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wallet(0x{})", hex::encode(&self.0))
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// A 32-byte CREATE2 salt.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Salt([u8; 32]);

impl Salt {
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Builds a salt whose leading bytes are the wallet and whose trailing
    /// bytes are `nonce`.
    #[inline]
    pub fn bound_to(wallet: &Wallet, nonce: &[u8; NONCE_LEN]) -> Self {
        let mut bytes = [0u8; 32];
        let prefix = wallet.len().min(WALLET_PREFIX_LEN);
        bytes[..prefix].copy_from_slice(&wallet.as_bytes()[..prefix]);
        bytes[WALLET_PREFIX_LEN..].copy_from_slice(nonce);
        Self(bytes)
    }

    pub fn is_bound_to(&self, wallet: &Wallet) -> bool {
        let prefix = wallet.len().min(WALLET_PREFIX_LEN);
        self.0[..prefix] == wallet.as_bytes()[..prefix]
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex_prefixed(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Salt as a decimal integer (big-endian).
    pub fn to_decimal(&self) -> String {
        let Some(start) = self.0.iter().position(|&b| b != 0) else {
            return "0".to_string();
        };

        // Decimal digits, least significant first.
        let mut digits: Vec<u8> = vec![0];
        for &byte in &self.0[start..] {
            let mut carry = byte as u32;
            for d in digits.iter_mut() {
                let val = (*d as u32) * 256 + carry;
                *d = (val % 10) as u8;
                carry = val / 10;
            }
            while carry > 0 {
                digits.push((carry % 10) as u8);
                carry /= 10;
            }
        }

        digits.iter().rev().map(|d| (b'0' + d) as char).collect()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex_prefixed())
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_prefixed())
    }
}

/// One trial's outcome: the unit of comparison and of reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub address: Address,
    pub score: Score,
    pub salt: Salt,
}

impl Candidate {
    /// True if this candidate should replace one scoring `threshold`.
    /// `None` stands for "nothing yet" and loses to every score.
    #[inline]
    pub fn beats(&self, threshold: Option<Score>) -> bool {
        Some(self.score) > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_rejects_empty() {
        assert_eq!(Wallet::new(Vec::new()), Err(WalletError::Empty));
        assert_eq!(Wallet::from_hex("0x"), Err(WalletError::Empty));
        assert!(matches!(Wallet::from_hex("zz"), Err(WalletError::InvalidHex(_))));
    }

    #[test]
    fn test_salt_binding() {
        let wallet = Wallet::from_hex("0xd8da6bf26964af9d7eed9e03e53415d37aa96045").unwrap();
        let salt = Salt::bound_to(&wallet, &[0xff; NONCE_LEN]);
        assert!(salt.is_bound_to(&wallet));
        assert_eq!(&salt.as_bytes()[..20], wallet.as_bytes());
        assert_eq!(&salt.as_bytes()[20..], &[0xff; NONCE_LEN]);

        let other = Wallet::from_hex("0x0000000000000000000000000000000000000001").unwrap();
        assert!(!salt.is_bound_to(&other));
    }

    #[test]
    fn test_salt_decimal() {
        assert_eq!(Salt::default().to_decimal(), "0");
        let mut bytes = [0u8; 32];
        bytes[30] = 0x01;
        bytes[31] = 0x00;
        assert_eq!(Salt::from_bytes(bytes).to_decimal(), "256");
        assert_eq!(
            Salt::from_bytes([0xff; 32]).to_decimal(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn test_beats_is_strict() {
        let c = Candidate {
            address: Address::default(),
            score: 5,
            salt: Salt::default(),
        };
        assert!(c.beats(None));
        assert!(c.beats(Some(4)));
        assert!(!c.beats(Some(5)));
        assert!(!c.beats(Some(6)));
    }
}
