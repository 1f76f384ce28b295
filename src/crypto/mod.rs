//! Address derivation.
//!
//! The search core only sees the [`Primitive`] contract: a deterministic
//! `(wallet, salt) -> address` mapping that may need a load step before use.
//! [`Create2Primitive`] is the concrete CREATE2 implementation:
//! - address = keccak256(0xff || deployer || salt || initCodeHash)[12..32]  [85 bytes -> 20 bytes]

mod address;
pub mod create2;

pub use address::Address;
pub use create2::{create2_address, Create2Primitive};
use tiny_keccak::{Hasher, Keccak};

use crate::search::{Salt, Wallet};

/// Keccak-256 of arbitrary bytes (output 32 bytes).
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(input);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Errors raised by a derivation primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeriveError {
    #[error("wallet must be 20 bytes, got {0}")]
    MalformedWallet(usize),

    #[error("salt is not bound to the wallet")]
    UnboundSalt,

    #[error("primitive not loaded: {0}")]
    NotLoaded(String),

    #[error("derivation failed: {0}")]
    Failed(String),
}

/// A deterministic, pure `(wallet, salt) -> address` mapping.
///
/// `initialize` runs once on each search unit's own thread before the unit
/// accepts work. A failure there is reported as an init failure, never as a
/// batch error.
pub trait Primitive: Send + Sync + 'static {
    fn initialize(&self) -> Result<(), DeriveError> {
        Ok(())
    }

    fn derive(&self, wallet: &Wallet, salt: &Salt) -> Result<Address, DeriveError>;
}
