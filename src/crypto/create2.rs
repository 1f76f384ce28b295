//! CREATE2 address computation.
//!
//! Matches the EVM CREATE2 opcode:
//!   address = keccak256(0xff || deployer || salt || keccak256(initCode))[12:32]
//!
//! The default deployer and init code hash are those of the Uniswap v4
//! PoolManager address-mining challenge.

use crate::search::{Salt, Wallet};

use super::{keccak256, Address, DeriveError, Primitive};

/// Uniswap v4 deployer.
pub const UNISWAP_DEPLOYER: [u8; 20] = [
    0x48, 0xe5, 0x16, 0xb3, 0x4a, 0x12, 0x74, 0xf4, 0x94, 0x57, 0xb9, 0xc6, 0x18, 0x20, 0x97,
    0x79, 0x6d, 0x04, 0x98, 0xcb,
];

/// Uniswap v4 PoolManager init code hash.
pub const UNISWAP_INIT_CODE_HASH: [u8; 32] = [
    0x94, 0xd1, 0x14, 0x29, 0x6a, 0x5a, 0xf8, 0x5c, 0x1f, 0xd2, 0xdc, 0x03, 0x9c, 0xda, 0xa3,
    0x2f, 0x1e, 0xd4, 0xb0, 0xfe, 0x08, 0x68, 0xf0, 0x2d, 0x88, 0x8b, 0xfc, 0x91, 0xfe, 0xb6,
    0x45, 0xd9,
];

/// Computes a CREATE2 address.
/// Preimage: 0xff (1) || deployer (20) || salt (32) || init_code_hash (32) = 85 bytes.
pub fn create2_address(deployer: &[u8; 20], salt: &[u8; 32], init_code_hash: &[u8; 32]) -> Address {
    let mut preimage = [0u8; 85];
    preimage[0] = 0xff;
    preimage[1..21].copy_from_slice(deployer);
    preimage[21..53].copy_from_slice(salt);
    preimage[53..85].copy_from_slice(init_code_hash);

    let hash = keccak256(&preimage);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address::from_bytes(addr)
}

/// CREATE2 derivation for a fixed deployer and init code.
///
/// The wallet is the 20-byte sender the salt must be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Create2Primitive {
    deployer: [u8; 20],
    init_code_hash: [u8; 32],
}

impl Create2Primitive {
    pub fn new(deployer: [u8; 20], init_code_hash: [u8; 32]) -> Self {
        Self {
            deployer,
            init_code_hash,
        }
    }

    pub fn deployer(&self) -> &[u8; 20] {
        &self.deployer
    }

    pub fn init_code_hash(&self) -> &[u8; 32] {
        &self.init_code_hash
    }
}

impl Default for Create2Primitive {
    fn default() -> Self {
        Self::new(UNISWAP_DEPLOYER, UNISWAP_INIT_CODE_HASH)
    }
}

impl Primitive for Create2Primitive {
    fn derive(&self, wallet: &Wallet, salt: &Salt) -> Result<Address, DeriveError> {
        if wallet.len() != 20 {
            return Err(DeriveError::MalformedWallet(wallet.len()));
        }
        if !salt.is_bound_to(wallet) {
            return Err(DeriveError::UnboundSalt);
        }
        Ok(create2_address(&self.deployer, salt.as_bytes(), &self.init_code_hash))
    }
}
