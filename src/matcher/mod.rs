//! Address scoring.
//!
//! A [`Scorer`] maps an address to a [`Score`]; higher is more desirable.
//! Supported strategies:
//! - Uniswap: the v4 address-mining challenge rule (leading zeros, then 4s)
//! - Leading nibble: count of leading nibbles equal to a value
//! - Pattern: progress towards a hex prefix/suffix/contains pattern

mod pattern;
mod uniswap;

use std::str::FromStr;

use crate::crypto::Address;

pub use pattern::{LeadingNibbleScorer, Pattern, PatternScorer, PatternType};
pub use uniswap::UniswapScorer;

/// Totally ordered desirability of an address.
pub type Score = u64;

/// Pure, deterministic address scoring.
pub trait Scorer: Send + Sync + 'static {
    fn score(&self, address: &Address) -> Score;
}

/// Which scorer the CLI builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScorerKind {
    #[default]
    Uniswap,
    Leading,
    Pattern,
}

impl FromStr for ScorerKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniswap" | "v4" => Ok(ScorerKind::Uniswap),
            "leading" | "zeros" => Ok(ScorerKind::Leading),
            "pattern" => Ok(ScorerKind::Pattern),
            _ => Err(format!("Unknown scorer: {}", s)),
        }
    }
}

impl std::fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScorerKind::Uniswap => write!(f, "uniswap"),
            ScorerKind::Leading => write!(f, "leading"),
            ScorerKind::Pattern => write!(f, "pattern"),
        }
    }
}
