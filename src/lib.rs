//! # uni_vanity
//!
//! CREATE2 vanity salt miner. A pool of search units each runs batches of
//! `(salt -> address -> score)` trials for a fixed wallet; a coordinator
//! merges their best results and decides when to stop.
//!
//! ## Architecture
//!
//! - `crypto`: address derivation (CREATE2) behind the `Primitive` trait
//! - `matcher`: pluggable address scoring
//! - `search`: salts, candidates and the batch search loop
//! - `worker`: search units and the session coordinator
//! - `config`: command-line configuration

pub mod config;
pub mod crypto;
pub mod matcher;
pub mod search;
pub mod worker;

pub use config::Config;
pub use crypto::{Address, Create2Primitive, Primitive};
pub use matcher::{Score, Scorer};
pub use search::{Candidate, Salt, SaltPolicy, Wallet};
pub use worker::{Coordinator, Session, SessionConfig, SessionError, SessionEvent, StopReason};
