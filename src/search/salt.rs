//! Per-unit salt generation.

use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use super::candidate::{Salt, Wallet, NONCE_LEN};

/// A source of fresh salts. Owned by a single search loop; never shared.
pub trait SaltSource: Send {
    fn next_salt(&mut self, wallet: &Wallet) -> Salt;
}

/// How each search unit draws its salts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaltPolicy {
    /// Random starting nonce, then a big-endian counter.
    #[default]
    Sequential,
    /// A fresh random nonce for every trial.
    Random,
}

impl SaltPolicy {
    /// Builds an independent source. Called once per search unit.
    pub fn source(self) -> Box<dyn SaltSource> {
        match self {
            SaltPolicy::Sequential => Box::new(SequentialSalts::random_start()),
            SaltPolicy::Random => Box::new(RandomSalts::new()),
        }
    }
}

impl FromStr for SaltPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "seq" | "counter" => Ok(SaltPolicy::Sequential),
            "random" | "rand" => Ok(SaltPolicy::Random),
            _ => Err(format!("Unknown salt policy: {}", s)),
        }
    }
}

impl std::fmt::Display for SaltPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaltPolicy::Sequential => write!(f, "sequential"),
            SaltPolicy::Random => write!(f, "random"),
        }
    }
}

/// Increments a nonce without per-trial RNG calls. Units start at random
/// points so they explore different regions of the nonce space.
#[derive(Debug, Clone)]
pub struct SequentialSalts {
    nonce: [u8; NONCE_LEN],
}

impl SequentialSalts {
    pub fn starting_at(nonce: [u8; NONCE_LEN]) -> Self {
        Self { nonce }
    }

    pub fn random_start() -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self { nonce }
    }
}

impl SaltSource for SequentialSalts {
    fn next_salt(&mut self, wallet: &Wallet) -> Salt {
        let salt = Salt::bound_to(wallet, &self.nonce);
        increment_nonce(&mut self.nonce);
        salt
    }
}

pub struct RandomSalts {
    rng: StdRng,
}

impl RandomSalts {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSalts {
    fn default() -> Self {
        Self::new()
    }
}

impl SaltSource for RandomSalts {
    fn next_salt(&mut self, wallet: &Wallet) -> Salt {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill_bytes(&mut nonce);
        Salt::bound_to(wallet, &nonce)
    }
}

/// Increment a big-endian integer by 1 (with wrapping).
#[inline]
fn increment_nonce(nonce: &mut [u8]) {
    for byte in nonce.iter_mut().rev() {
        let (val, overflow) = byte.overflowing_add(1);
        *byte = val;
        if !overflow {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Wallet {
        Wallet::from_hex("0x2c8b14a270eb080c2662a12936bb6b2babf15bf8").unwrap()
    }

    #[test]
    fn test_increment_carries() {
        let mut n = [0u8, 0x01, 0xff, 0xff];
        increment_nonce(&mut n);
        assert_eq!(n, [0u8, 0x02, 0x00, 0x00]);

        let mut n = [0xffu8; 4];
        increment_nonce(&mut n);
        assert_eq!(n, [0u8; 4]);
    }

    #[test]
    fn test_sequential_salts_are_fresh_and_bound() {
        let wallet = wallet();
        let mut source = SequentialSalts::starting_at([0u8; NONCE_LEN]);
        let a = source.next_salt(&wallet);
        let b = source.next_salt(&wallet);
        assert_ne!(a, b);
        assert!(a.is_bound_to(&wallet) && b.is_bound_to(&wallet));
        assert_eq!(b.as_bytes()[31], 1);
    }

    #[test]
    fn test_random_salts_are_bound() {
        let wallet = wallet();
        let mut source = RandomSalts::seeded(42);
        let a = source.next_salt(&wallet);
        let b = source.next_salt(&wallet);
        assert_ne!(a, b);
        assert!(a.is_bound_to(&wallet));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("random".parse::<SaltPolicy>(), Ok(SaltPolicy::Random));
        assert_eq!("Sequential".parse::<SaltPolicy>(), Ok(SaltPolicy::Sequential));
        assert!("bogus".parse::<SaltPolicy>().is_err());
    }
}
