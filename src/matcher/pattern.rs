//! Hex pattern scoring for 20-byte addresses.

use std::str::FromStr;

use crate::crypto::Address;

use super::uniswap::run_length;
use super::{Score, Scorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternType {
    #[default]
    Prefix,
    Suffix,
    Contains,
    PrefixAndSuffix,
}

impl FromStr for PatternType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prefix" | "start" | "begin" => Ok(PatternType::Prefix),
            "suffix" | "end" => Ok(PatternType::Suffix),
            "contains" | "anywhere" | "any" => Ok(PatternType::Contains),
            "prefixandsuffix" | "both" => Ok(PatternType::PrefixAndSuffix),
            _ => Err(format!("Unknown pattern type: {}", s)),
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternType::Prefix => write!(f, "prefix"),
            PatternType::Suffix => write!(f, "suffix"),
            PatternType::Contains => write!(f, "contains"),
            PatternType::PrefixAndSuffix => write!(f, "prefix+suffix"),
        }
    }
}

/// A hex pattern, pre-parsed for matching.
///
/// Case-insensitive patterns are compared nibble by nibble. Case-sensitive
/// ones are compared against the EIP-55 checksum spelling of the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pattern: String,
    suffix: Option<String>,
    pattern_type: PatternType,
    case_sensitive: bool,
    pattern_symbols: Vec<u8>,
    suffix_symbols: Vec<u8>,
}

/// Convert hex string to nibble array. Each char becomes one u8 (0..15).
fn hex_to_nibbles(hex: &str) -> Vec<u8> {
    hex.bytes()
        .map(|b| match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => 0,
        })
        .collect()
}

/// Number of leading symbols of `needle` found at the start of `haystack`.
#[inline]
fn prefix_progress(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .iter()
        .zip(needle)
        .take_while(|(h, n)| h == n)
        .count()
}

/// Number of trailing symbols of `needle` found at the end of `haystack`.
#[inline]
fn suffix_progress(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .iter()
        .rev()
        .zip(needle.iter().rev())
        .take_while(|(h, n)| h == n)
        .count()
}

#[inline]
fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl Pattern {
    pub fn new(pattern: impl Into<String>, pattern_type: PatternType, case_sensitive: bool) -> Self {
        let pattern = normalize(pattern.into(), case_sensitive);
        let pattern_symbols = symbols(&pattern, case_sensitive);
        Self {
            pattern,
            suffix: None,
            pattern_type,
            case_sensitive,
            pattern_symbols,
            suffix_symbols: Vec::new(),
        }
    }

    pub fn new_prefix_and_suffix(
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        case_sensitive: bool,
    ) -> Self {
        let prefix = normalize(prefix.into(), case_sensitive);
        let suffix = normalize(suffix.into(), case_sensitive);
        let pattern_symbols = symbols(&prefix, case_sensitive);
        let suffix_symbols = symbols(&suffix, case_sensitive);
        Self {
            pattern: prefix,
            suffix: Some(suffix),
            pattern_type: PatternType::PrefixAndSuffix,
            case_sensitive,
            pattern_symbols,
            suffix_symbols,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Score of a full match.
    pub fn max_score(&self) -> Score {
        (self.pattern_symbols.len() + self.suffix_symbols.len()) as Score
    }

    /// Symbols of the pattern satisfied in place.
    #[inline]
    pub fn progress(&self, address: &Address) -> usize {
        if self.case_sensitive {
            let checksum = address.to_checksum();
            self.progress_in(&checksum.as_bytes()[2..])
        } else {
            self.progress_in(&address.nibbles())
        }
    }

    fn progress_in(&self, haystack: &[u8]) -> usize {
        match self.pattern_type {
            PatternType::Prefix => prefix_progress(haystack, &self.pattern_symbols),
            PatternType::Suffix => suffix_progress(haystack, &self.pattern_symbols),
            PatternType::Contains => {
                if contains(haystack, &self.pattern_symbols) {
                    self.pattern_symbols.len()
                } else {
                    0
                }
            }
            PatternType::PrefixAndSuffix => {
                prefix_progress(haystack, &self.pattern_symbols)
                    + suffix_progress(haystack, &self.suffix_symbols)
            }
        }
    }

    #[inline]
    pub fn is_match(&self, address: &Address) -> bool {
        self.progress(address) as Score == self.max_score()
    }

    pub fn estimated_difficulty(&self) -> u64 {
        let mut difficulty = 16u64.saturating_pow(self.max_score() as u32);
        if self.case_sensitive {
            // Each letter also has to land on the right case.
            let letters = self
                .pattern
                .chars()
                .chain(self.suffix.iter().flat_map(|s| s.chars()))
                .filter(|c| c.is_ascii_alphabetic())
                .count();
            difficulty = difficulty.saturating_mul(2u64.saturating_pow(letters as u32));
        }
        difficulty
    }

    pub fn difficulty_description(&self) -> String {
        match self.estimated_difficulty() {
            0..=1_000 => "Very Easy (< 1 second)".into(),
            1_001..=100_000 => "Easy (seconds)".into(),
            100_001..=10_000_000 => "Medium (minutes)".into(),
            10_000_001..=1_000_000_000 => "Hard (hours)".into(),
            _ => "Very Hard (days or more)".into(),
        }
    }
}

fn normalize(s: String, case_sensitive: bool) -> String {
    if case_sensitive {
        s
    } else {
        s.to_lowercase()
    }
}

fn symbols(s: &str, case_sensitive: bool) -> Vec<u8> {
    if case_sensitive {
        s.as_bytes().to_vec()
    } else {
        hex_to_nibbles(s)
    }
}

/// Scores an address by how much of a [`Pattern`] it already satisfies.
#[derive(Debug, Clone)]
pub struct PatternScorer {
    pattern: Pattern,
}

impl PatternScorer {
    pub fn new(pattern: Pattern) -> Self {
        Self { pattern }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl Scorer for PatternScorer {
    fn score(&self, address: &Address) -> Score {
        self.pattern.progress(address) as Score
    }
}

/// Count of leading nibbles equal to `nibble` (leading zeros by default).
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadingNibbleScorer {
    nibble: u8,
}

impl LeadingNibbleScorer {
    pub fn new(nibble: u8) -> Self {
        Self {
            nibble: nibble & 0x0f,
        }
    }
}

impl Scorer for LeadingNibbleScorer {
    fn score(&self, address: &Address) -> Score {
        run_length(&address.nibbles(), 0, self.nibble) as Score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(hex_str: &str) -> Address {
        let h = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let b: [u8; 20] = hex::decode(h).unwrap().try_into().unwrap();
        Address::from_bytes(b)
    }

    #[test]
    fn test_prefix() {
        let p = Pattern::new("DEAD", PatternType::Prefix, false);
        assert!(p.is_match(&addr("deadbeef00000000000000000000000000000000")));
        assert_eq!(p.progress(&addr("dea0beef00000000000000000000000000000000")), 3);
        assert_eq!(p.progress(&addr("beefdead00000000000000000000000000000000")), 0);
    }

    #[test]
    fn test_suffix() {
        let p = Pattern::new("beef", PatternType::Suffix, false);
        assert!(p.is_match(&addr("000000000000000000000000000000000000beef")));
        assert_eq!(p.progress(&addr("00000000000000000000000000000000000000ef")), 2);
    }

    #[test]
    fn test_contains() {
        let p = Pattern::new("cafe", PatternType::Contains, false);
        assert!(p.is_match(&addr("0000000000000000cafe00000000000000000000")));
        assert_eq!(p.progress(&addr("0000000000000000caf000000000000000000000")), 0);
    }

    #[test]
    fn test_prefix_and_suffix_score() {
        let scorer = PatternScorer::new(Pattern::new_prefix_and_suffix("ab", "cd", false));
        assert_eq!(scorer.score(&addr("ab000000000000000000000000000000000000cd")), 4);
        assert_eq!(scorer.score(&addr("a00000000000000000000000000000000000000d")), 2);
        assert_eq!(scorer.pattern().max_score(), 4);
    }

    #[test]
    fn test_leading_nibble() {
        let zeros = LeadingNibbleScorer::default();
        assert_eq!(zeros.score(&addr("000f000000000000000000000000000000000000")), 3);
        assert_eq!(zeros.score(&addr("0000000000000000000000000000000000000000")), 40);
        let aaa = LeadingNibbleScorer::new(0xa);
        assert_eq!(aaa.score(&addr("aaa0000000000000000000000000000000000000")), 3);
    }

    #[test]
    fn test_case_sensitive_uses_checksum() {
        // EIP-55 vector: 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed
        let a = addr("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        let exact = Pattern::new("5aAeb", PatternType::Prefix, true);
        assert!(exact.is_case_sensitive());
        assert!(exact.is_match(&a));
        assert_eq!(Pattern::new("5aaeb", PatternType::Prefix, true).progress(&a), 2);
        assert!(Pattern::new("5aaeb", PatternType::Prefix, false).is_match(&a));
        assert!(Pattern::new("BeAed", PatternType::Suffix, true).is_match(&a));
    }
}
