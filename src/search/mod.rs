//! Search loop and the values it produces.

mod batch;
mod best;
mod candidate;
mod salt;

pub use batch::SearchLoop;
pub use best::BestKnown;
pub use candidate::{Candidate, Salt, Wallet, WalletError, NONCE_LEN, WALLET_PREFIX_LEN};
pub use salt::{RandomSalts, SaltPolicy, SaltSource, SequentialSalts};

#[cfg(test)]
pub(crate) use batch::testing;
