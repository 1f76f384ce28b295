//! Uniswap v4 address-mining challenge scoring.

use crate::crypto::Address;

use super::{Score, Scorer};

/// Scores addresses by the v4 challenge rules:
/// - 10 points per leading zero nibble
/// - the first non-zero nibble must be a 4, otherwise the score is 0
/// - +60 for exactly four leading 4s, +40 for more than four
/// - +1 for every 4 nibble anywhere
/// - +20 if the last four nibbles are 4s
#[derive(Debug, Clone, Copy, Default)]
pub struct UniswapScorer;

/// Length of the run of `nibble` starting at `start`.
pub(crate) fn run_length(nibbles: &[u8; 40], start: usize, nibble: u8) -> usize {
    nibbles[start.min(40)..]
        .iter()
        .take_while(|&&n| n == nibble)
        .count()
}

impl Scorer for UniswapScorer {
    fn score(&self, address: &Address) -> Score {
        let nibbles = address.nibbles();

        let zeros = run_length(&nibbles, 0, 0);
        let fours = run_length(&nibbles, zeros, 4);
        if fours == 0 {
            return 0;
        }

        let mut score = (zeros * 10) as Score;
        if fours == 4 {
            score += 60;
        } else if fours > 4 {
            score += 40;
        }

        score += nibbles.iter().filter(|&&n| n == 4).count() as Score;

        let bytes = address.as_bytes();
        if bytes[18] == 0x44 && bytes[19] == 0x44 {
            score += 20;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(hex_str: &str) -> Address {
        let b: [u8; 20] = hex::decode(hex_str).unwrap().try_into().unwrap();
        Address::from_bytes(b)
    }

    #[test]
    fn test_requires_four_after_zeros() {
        assert_eq!(UniswapScorer.score(&addr("0051000000000000000000000000000000000000")), 0);
        assert_eq!(UniswapScorer.score(&addr("0000000000000000000000000000000000000000")), 0);
    }

    #[test]
    fn test_single_four() {
        // 2 zeros (20) + one 4 (1)
        assert_eq!(UniswapScorer.score(&addr("0041000000000000000000000000000000000000")), 21);
    }

    #[test]
    fn test_exactly_four_fours() {
        // 1 zero (10) + four 4s bonus (60) + four 4 nibbles (4)
        assert_eq!(UniswapScorer.score(&addr("0444410000000000000000000000000000000000")), 74);
    }

    #[test]
    fn test_more_than_four_fours_and_tail() {
        // 0 zeros + five 4s bonus (40) + nine 4 nibbles (9) + tail (20)
        assert_eq!(UniswapScorer.score(&addr("4444410000000000000000000000000000004444")), 69);
    }
}
