//! The session-wide best candidate.

use crate::matcher::Score;

use super::candidate::Candidate;

/// Highest-scoring candidate seen so far plus the total attempt count.
///
/// Owned by exactly one mutator (the coordinator loop); nothing else writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BestKnown {
    candidate: Option<Candidate>,
    floor: Option<Score>,
    attempts: u64,
}

impl BestKnown {
    /// Starts from a caller-supplied floor. `None` is "nothing found".
    pub fn with_floor(floor: Option<Score>) -> Self {
        Self {
            candidate: None,
            floor,
            attempts: 0,
        }
    }

    /// The threshold a new candidate has to beat.
    pub fn score(&self) -> Option<Score> {
        self.candidate.map(|c| c.score).or(self.floor)
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn record_attempts(&mut self, n: u64) {
        self.attempts = self.attempts.saturating_add(n);
    }

    /// Adopts `candidate` only if it strictly beats the live best score.
    /// Returns whether it was adopted; otherwise `self` is untouched.
    pub fn merge(&mut self, candidate: Candidate) -> bool {
        if !candidate.beats(self.score()) {
            return false;
        }
        self.candidate = Some(candidate);
        true
    }

    pub fn reached(&self, target: Score) -> bool {
        self.score().is_some_and(|s| s >= target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Address;
    use crate::search::Salt;

    fn candidate(score: Score, tag: u8) -> Candidate {
        Candidate {
            address: Address::from_bytes([tag; 20]),
            score,
            salt: Salt::from_bytes([tag; 32]),
        }
    }

    #[test]
    fn test_monotonic_under_any_order() {
        let scores = [3, 1, 7, 7, 2, 9, 0, 9, 8];
        let mut best = BestKnown::with_floor(None);
        let mut last = None;
        for (i, s) in scores.into_iter().enumerate() {
            best.merge(candidate(s, i as u8));
            assert!(best.score() >= last);
            last = best.score();
        }
        assert_eq!(best.score(), Some(9));
        // First 9 wins; the later equal score is not an improvement.
        assert_eq!(best.candidate().unwrap().salt, Salt::from_bytes([5; 32]));
    }

    #[test]
    fn test_non_improvement_is_a_no_op() {
        let mut best = BestKnown::with_floor(None);
        assert!(best.merge(candidate(5, 1)));
        let before = best.clone();
        assert!(!best.merge(candidate(5, 2)));
        assert!(!best.merge(candidate(4, 3)));
        assert_eq!(best, before);
    }

    #[test]
    fn test_floor_is_respected() {
        let mut best = BestKnown::with_floor(Some(4));
        assert!(!best.merge(candidate(4, 1)));
        assert!(best.candidate().is_none());
        assert!(best.merge(candidate(5, 2)));
        assert!(best.reached(5));
        assert!(!best.reached(6));
    }

    #[test]
    fn test_concurrent_arrival_order_converges() {
        for order in [[5, 7], [7, 5]] {
            let mut best = BestKnown::with_floor(Some(4));
            for s in order {
                best.merge(candidate(s, s as u8));
            }
            assert_eq!(best.score(), Some(7));
            assert_eq!(best.candidate().unwrap().salt, Salt::from_bytes([7; 32]));
        }
    }
}
