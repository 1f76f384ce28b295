//! Runtime configuration for the CREATE2 salt miner.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use crate::crypto::Create2Primitive;
use crate::matcher::{
    LeadingNibbleScorer, Pattern, PatternScorer, PatternType, Score, Scorer, ScorerKind,
    UniswapScorer,
};
use crate::search::{SaltPolicy, Wallet};
use crate::worker::SessionConfig;

/// Uniswap v4 CREATE2 Salt Miner
///
/// Searches salts (wallet-bound, 32 bytes) whose CREATE2 address scores at
/// least the target score.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Sender address the salts are bound to (20 bytes, hex with or without 0x)
    #[arg(long)]
    pub wallet: String,

    /// Stop once the best score reaches this
    #[arg(short = 'T', long)]
    pub target_score: Score,

    /// Number of search units (default: number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Trials per batch
    #[arg(short = 'b', long, default_value = "100000")]
    pub batch_size: u64,

    /// Stop after this many trials in total (0 = unbounded)
    #[arg(short = 'm', long, default_value = "0")]
    pub max_attempts: u64,

    /// Score the first result has to beat (e.g. a previously found best)
    #[arg(long)]
    pub floor: Option<Score>,

    /// Scorer: uniswap, leading, or pattern
    #[arg(long, default_value = "uniswap")]
    pub scorer: ScorerKind,

    /// Nibble counted by the leading scorer (0-f)
    #[arg(long, default_value = "0")]
    pub nibble: String,

    /// Pattern for the pattern scorer (hex characters only)
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Suffix pattern (when used, --pattern becomes the prefix and matching uses both)
    #[arg(short = 's', long)]
    pub suffix: Option<String>,

    /// Pattern type: prefix, suffix, or contains
    #[arg(short = 't', long, default_value = "prefix")]
    pub pattern_type: PatternType,

    /// Case sensitive (EIP-55 checksum) pattern matching
    #[arg(short = 'c', long, default_value = "false")]
    pub case_sensitive: bool,

    /// Salt policy: sequential or random
    #[arg(long, default_value = "sequential")]
    pub salts: SaltPolicy,

    /// CREATE2 deployer address (20 bytes hex)
    #[arg(long, default_value = "0x48E516B34A1274f49457b9C6182097796D0498Cb")]
    pub deployer: String,

    /// keccak256(initCode), 32 bytes hex
    #[arg(
        long,
        default_value = "0x94d114296a5af85c1fd2dc039cdaa32f1ed4b0fe0868f02d888bfc91feb645d9"
    )]
    pub init_code_hash: String,

    /// Restart a unit whose batch runs longer than this many seconds (0 = never)
    #[arg(long, default_value = "0")]
    pub batch_timeout: u64,

    /// Seconds a unit may take to load before it counts as failed
    #[arg(long, default_value = "30")]
    pub init_timeout: u64,

    /// Progress report interval in seconds
    #[arg(short = 'r', long, default_value = "5")]
    pub report_interval: u64,
}

impl Config {
    /// Returns the number of workers, defaulting to CPU count.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count() == 0 {
            return Err(ConfigError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.report_interval == 0 {
            return Err(ConfigError::InvalidConfig(
                "report_interval must be at least 1 second".into(),
            ));
        }

        parse_hex::<20>("wallet", &self.wallet)?;
        parse_hex::<20>("deployer", &self.deployer)?;
        parse_hex::<32>("init_code_hash", &self.init_code_hash)?;

        match self.scorer {
            ScorerKind::Uniswap => {}
            ScorerKind::Leading => {
                self.nibble_value()?;
            }
            ScorerKind::Pattern => self.validate_pattern()?,
        }

        Ok(())
    }

    fn validate_pattern(&self) -> Result<(), ConfigError> {
        let pattern = self.pattern.as_deref().ok_or_else(|| {
            ConfigError::InvalidPattern("--pattern is required with --scorer pattern".into())
        })?;
        check_hex_pattern("Pattern", pattern)?;
        if pattern.len() > 40 {
            return Err(ConfigError::InvalidPattern(
                "Pattern cannot be longer than 40 characters (full address)".into(),
            ));
        }

        if let Some(ref suffix) = self.suffix {
            check_hex_pattern("Suffix", suffix)?;
            if pattern.len() + suffix.len() > 40 {
                return Err(ConfigError::InvalidPattern(
                    "Combined prefix + suffix cannot be longer than 40 characters".into(),
                ));
            }
        }
        Ok(())
    }

    fn nibble_value(&self) -> Result<u8, ConfigError> {
        let s = self.nibble.strip_prefix("0x").unwrap_or(&self.nibble);
        if s.len() != 1 {
            return Err(ConfigError::InvalidConfig(
                "nibble must be a single hex digit".into(),
            ));
        }
        u8::from_str_radix(s, 16)
            .map_err(|_| ConfigError::InvalidConfig("nibble must be a single hex digit".into()))
    }

    pub fn wallet(&self) -> Result<Wallet, ConfigError> {
        let bytes = parse_hex::<20>("wallet", &self.wallet)?;
        Wallet::new(bytes.to_vec()).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    pub fn primitive(&self) -> Result<Create2Primitive, ConfigError> {
        Ok(Create2Primitive::new(
            parse_hex::<20>("deployer", &self.deployer)?,
            parse_hex::<32>("init_code_hash", &self.init_code_hash)?,
        ))
    }

    /// The pattern the pattern scorer matches against, if one is configured.
    pub fn build_pattern(&self) -> Option<Pattern> {
        let pattern = self.pattern.clone()?;
        Some(match self.suffix {
            Some(ref suffix) => {
                Pattern::new_prefix_and_suffix(pattern, suffix.clone(), self.case_sensitive)
            }
            None => Pattern::new(pattern, self.pattern_type, self.case_sensitive),
        })
    }

    pub fn scorer(&self) -> Result<Arc<dyn Scorer>, ConfigError> {
        Ok(match self.scorer {
            ScorerKind::Uniswap => Arc::new(UniswapScorer),
            ScorerKind::Leading => Arc::new(LeadingNibbleScorer::new(self.nibble_value()?)),
            ScorerKind::Pattern => {
                let pattern = self.build_pattern().ok_or_else(|| {
                    ConfigError::InvalidPattern(
                        "--pattern is required with --scorer pattern".into(),
                    )
                })?;
                Arc::new(PatternScorer::new(pattern))
            }
        })
    }

    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        Ok(
            SessionConfig::new(self.wallet()?, self.target_score, self.worker_count())
                .with_batch_size(self.batch_size)
                .with_max_attempts((self.max_attempts > 0).then_some(self.max_attempts))
                .with_floor(self.floor)
                .with_batch_timeout(
                    (self.batch_timeout > 0).then(|| Duration::from_secs(self.batch_timeout)),
                )
                .with_init_timeout(Duration::from_secs(self.init_timeout)),
        )
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }
}

fn check_hex_pattern(what: &str, s: &str) -> Result<(), ConfigError> {
    if s.is_empty() {
        return Err(ConfigError::InvalidPattern(format!("{} cannot be empty", what)));
    }
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidPattern(format!(
            "{} must contain only hex characters (0-9, a-f)",
            what
        )));
    }
    Ok(())
}

/// Decodes exactly `N` bytes of hex, with or without `0x`.
fn parse_hex<const N: usize>(what: &str, s: &str) -> Result<[u8; N], ConfigError> {
    let h = s.strip_prefix("0x").unwrap_or(s);
    let invalid = || {
        ConfigError::InvalidConfig(format!(
            "{} must be {} bytes ({} hex chars)",
            what,
            N,
            N * 2
        ))
    };
    if h.len() != N * 2 {
        return Err(invalid());
    }
    let bytes = hex::decode(h).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
