//! The search-and-score loop run by every search unit.

use std::sync::Arc;

use crate::crypto::{DeriveError, Primitive};
use crate::matcher::{Score, Scorer};

use super::candidate::{Candidate, Wallet};
use super::salt::SaltSource;

/// One batch of trials against a fixed wallet.
pub struct SearchLoop {
    primitive: Arc<dyn Primitive>,
    scorer: Arc<dyn Scorer>,
    salts: Box<dyn SaltSource>,
    completed: u64,
}

impl SearchLoop {
    pub fn new(
        primitive: Arc<dyn Primitive>,
        scorer: Arc<dyn Scorer>,
        salts: Box<dyn SaltSource>,
    ) -> Self {
        Self {
            primitive,
            scorer,
            salts,
            completed: 0,
        }
    }

    /// Trials finished by the current (or last) batch. Still meaningful
    /// after `search` fails or unwinds, so partial work can be counted.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Runs exactly `iterations` trials and returns the best one if it
    /// strictly beats `threshold`.
    ///
    /// Ties inside the batch go to the earliest trial. `threshold == None`
    /// means any scored trial is an improvement. The first derivation error
    /// aborts the batch.
    pub fn search(
        &mut self,
        wallet: &Wallet,
        iterations: u64,
        threshold: Option<Score>,
    ) -> Result<Option<Candidate>, DeriveError> {
        let mut best: Option<Candidate> = None;
        self.completed = 0;

        for _ in 0..iterations {
            let salt = self.salts.next_salt(wallet);
            let address = self.primitive.derive(wallet, &salt)?;
            let score = self.scorer.score(&address);
            self.completed += 1;

            if best.map_or(true, |b| score > b.score) {
                best = Some(Candidate {
                    address,
                    score,
                    salt,
                });
            }
        }

        Ok(best.filter(|c| c.beats(threshold)))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::matcher::LeadingNibbleScorer;

    fn wallet() -> Wallet {
        Wallet::new(b"W".to_vec()).unwrap()
    }

    fn search_loop(scores: Vec<u8>) -> SearchLoop {
        SearchLoop::new(
            Arc::new(ScriptedPrimitive::new(scores)),
            Arc::new(FirstByteScorer),
            Box::new(CountingSalts(0)),
        )
    }

    #[test]
    fn test_returns_batch_maximum() {
        let mut l = search_loop(vec![0, 1, 3, 2, 0]);
        let best = l.search(&wallet(), 5, None).unwrap().unwrap();
        assert_eq!(best.score, 3);
        assert_eq!(counter_of(&best.salt), 2);
    }

    #[test]
    fn test_ties_go_to_first_trial() {
        let mut l = search_loop(vec![1, 4, 2, 4]);
        let best = l.search(&wallet(), 4, Some(0)).unwrap().unwrap();
        assert_eq!(best.score, 4);
        assert_eq!(counter_of(&best.salt), 1);
    }

    #[test]
    fn test_only_strict_improvements() {
        let mut l = search_loop(vec![0, 1, 3, 2, 0]);
        assert_eq!(l.search(&wallet(), 5, Some(3)).unwrap(), None);
        assert!(l.search(&wallet(), 5, Some(2)).unwrap().is_some());
    }

    #[test]
    fn test_max_threshold_yields_none() {
        // Leading-zero count tops out at 40 nibbles.
        let mut l = SearchLoop::new(
            Arc::new(ScriptedPrimitive::new(vec![0])),
            Arc::new(LeadingNibbleScorer::new(0)),
            Box::new(CountingSalts(0)),
        );
        assert_eq!(l.search(&wallet(), 50, Some(40)).unwrap(), None);
    }

    #[test]
    fn test_exact_iteration_count() {
        let primitive = Arc::new(ScriptedPrimitive::new(vec![1]));
        let mut l = SearchLoop::new(
            primitive.clone(),
            Arc::new(FirstByteScorer),
            Box::new(CountingSalts(0)),
        );
        l.search(&wallet(), 17, None).unwrap();
        assert_eq!(primitive.derives.load(std::sync::atomic::Ordering::Relaxed), 17);
        assert_eq!(l.search(&wallet(), 0, None).unwrap(), None);
    }

    #[test]
    fn test_derive_error_aborts_batch() {
        let primitive = ScriptedPrimitive::new(vec![1]);
        *primitive.fail_batches.lock().unwrap() = 1;
        let mut l = SearchLoop::new(
            Arc::new(primitive),
            Arc::new(FirstByteScorer),
            Box::new(CountingSalts(0)),
        );
        assert!(matches!(
            l.search(&wallet(), 3, None),
            Err(DeriveError::Failed(_))
        ));
        assert_eq!(l.completed(), 0);
    }

    #[test]
    fn test_completed_counts_trials_before_failure() {
        let primitive = ScriptedPrimitive::new(vec![1]);
        *primitive.fail_once_at.lock().unwrap() = Some(4);
        let mut l = SearchLoop::new(
            Arc::new(primitive),
            Arc::new(FirstByteScorer),
            Box::new(CountingSalts(0)),
        );
        assert!(l.search(&wallet(), 10, None).is_err());
        assert_eq!(l.completed(), 4);
        l.search(&wallet(), 6, None).unwrap();
        assert_eq!(l.completed(), 6);
    }
}
