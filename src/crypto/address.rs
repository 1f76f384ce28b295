//! 20-byte contract address.

use std::fmt;

use super::keccak256;

/// A derived contract address (20 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    #[inline]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// All 40 nibbles, on the stack.
    #[inline]
    pub fn nibbles(&self) -> [u8; 40] {
        let mut nibbles = [0u8; 40];
        for (i, byte) in self.0.iter().enumerate() {
            nibbles[i * 2] = byte >> 4;
            nibbles[i * 2 + 1] = byte & 0x0f;
        }
        nibbles
    }

    /// Lowercase hex (no 0x).
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_hex_prefixed(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// EIP-55 checksum encoding.
    pub fn to_checksum(&self) -> String {
        let hex_addr = self.to_hex();
        let hash = keccak256(hex_addr.as_bytes());

        let mut checksum = String::with_capacity(42);
        checksum.push_str("0x");
        for (i, c) in hex_addr.chars().enumerate() {
            let hash_nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && hash_nibble >= 8 {
                checksum.push(c.to_ascii_uppercase());
            } else {
                checksum.push(c);
            }
        }
        checksum
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex_prefixed())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_checksum())
    }
}
