/*!
 * Shield Configuration
 *
 * Runtime configuration for directory strategy selection and pool sizing
 */

use crate::core::limits::{
    AUTO_POOLED_THRESHOLD, DEFAULT_BUCKET_COUNT, DEFAULT_POOL_SIZE, DEFAULT_TABLE_CAPACITY,
    MAX_BUCKET_COUNT, MAX_POOL_SIZE,
};
use crate::core::{ShieldError, ShieldResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Directory strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Fixed array, linear scan (few locks per thread)
    Bounded,
    /// Hashed directory over a node pool (many locks per thread)
    Pooled,
    /// Pick based on expected per-thread fan-out
    Auto,
}

impl FromStr for StrategyType {
    type Err = ShieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bounded" | "array" => Ok(Self::Bounded),
            "pooled" | "hash" => Ok(Self::Pooled),
            "auto" => Ok(Self::Auto),
            other => Err(ShieldError::InvalidConfig(format!(
                "unknown strategy '{other}' (expected bounded, pooled or auto)"
            ))),
        }
    }
}

/// Sizing of pooled directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Preallocated nodes per thread
    pub pool_size: usize,
    /// Hash buckets per thread (rounded up to a power of two)
    pub bucket_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            bucket_count: DEFAULT_BUCKET_COUNT,
        }
    }
}

impl PoolConfig {
    pub const fn new(pool_size: usize, bucket_count: usize) -> Self {
        Self {
            pool_size,
            bucket_count,
        }
    }

    pub fn validate(&self) -> ShieldResult<()> {
        if self.pool_size > MAX_POOL_SIZE {
            return Err(ShieldError::InvalidConfig(format!(
                "pool_size {} exceeds {}",
                self.pool_size, MAX_POOL_SIZE
            )));
        }
        if self.bucket_count == 0 || self.bucket_count > MAX_BUCKET_COUNT {
            return Err(ShieldError::InvalidConfig(format!(
                "bucket_count must be in 1..={}, got {}",
                MAX_BUCKET_COUNT, self.bucket_count
            )));
        }
        Ok(())
    }
}

/// Shield configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Preferred strategy
    pub strategy: StrategyType,
    /// Distinct locks a thread is expected to hold at once (for `Auto`)
    pub expected_fanout: usize,
    /// Pool sizing for the pooled strategy
    pub pool: PoolConfig,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyType::Auto,
            expected_fanout: 1,
            pool: PoolConfig::default(),
        }
    }
}

impl ShieldConfig {
    /// Configuration for threads nesting only a handful of locks
    pub const fn few_locks() -> Self {
        Self {
            strategy: StrategyType::Bounded,
            expected_fanout: DEFAULT_TABLE_CAPACITY,
            pool: PoolConfig::new(DEFAULT_POOL_SIZE, DEFAULT_BUCKET_COUNT),
        }
    }

    /// Configuration for deep lock hierarchies
    pub const fn many_locks() -> Self {
        Self {
            strategy: StrategyType::Pooled,
            expected_fanout: 64,
            pool: PoolConfig::new(64, 64),
        }
    }

    /// Load overrides from the environment
    ///
    /// - `SHIELD_STRATEGY`: bounded | pooled | auto
    /// - `SHIELD_POOL_SIZE`: preallocated nodes per thread
    /// - `SHIELD_BUCKETS`: hash buckets per thread
    pub fn from_env() -> ShieldResult<Self> {
        let mut config = Self::default();
        if let Ok(strategy) = std::env::var("SHIELD_STRATEGY") {
            config.strategy = strategy.parse()?;
        }
        if let Some(pool_size) = env_usize("SHIELD_POOL_SIZE")? {
            config.pool.pool_size = pool_size;
        }
        if let Some(buckets) = env_usize("SHIELD_BUCKETS")? {
            config.pool.bucket_count = buckets;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ShieldResult<()> {
        self.pool.validate()
    }

    /// Resolve `Auto` against the expected fan-out
    pub fn select_strategy(&self) -> StrategyType {
        match self.strategy {
            StrategyType::Auto if self.expected_fanout > AUTO_POOLED_THRESHOLD => {
                StrategyType::Pooled
            }
            StrategyType::Auto => StrategyType::Bounded,
            other => other,
        }
    }
}

fn env_usize(key: &str) -> ShieldResult<Option<usize>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ShieldError::InvalidConfig(format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_selection() {
        let mut config = ShieldConfig::default();
        assert_eq!(config.select_strategy(), StrategyType::Bounded);

        config.expected_fanout = 40;
        assert_eq!(config.select_strategy(), StrategyType::Pooled);

        config.strategy = StrategyType::Bounded;
        assert_eq!(config.select_strategy(), StrategyType::Bounded);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Pooled".parse::<StrategyType>().unwrap(), StrategyType::Pooled);
        assert_eq!("array".parse::<StrategyType>().unwrap(), StrategyType::Bounded);
        assert!("fifo".parse::<StrategyType>().is_err());
    }

    #[test]
    fn test_pool_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::new(0, 1).validate().is_ok());
        assert!(PoolConfig::new(4, 0).validate().is_err());
        assert!(PoolConfig::new(MAX_POOL_SIZE + 1, 16).validate().is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(ShieldConfig::few_locks().select_strategy(), StrategyType::Bounded);
        assert_eq!(ShieldConfig::many_locks().select_strategy(), StrategyType::Pooled);
        assert!(ShieldConfig::many_locks().validate().is_ok());
    }
}
