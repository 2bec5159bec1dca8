//! Consensus parameters
//!
//! Defaults come from [`crate::constants`]. Any subset of fields may be
//! overridden from JSON; missing fields keep their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;
use crate::pow::Target;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Upper bound on an encoded block, and on any single transaction in it
    pub max_block_size: usize,
    /// Seconds a block timestamp may run ahead of the validator's clock
    pub max_future_block_time: u64,
    /// Easiest compact target a block may declare
    pub pow_limit_bits: u32,
    pub genesis_reward: u64,
    pub genesis_bits: u32,
    pub genesis_timestamp: u32,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            max_block_size: MAX_BLOCK_SIZE,
            max_future_block_time: MAX_FUTURE_BLOCK_TIME,
            pow_limit_bits: POW_LIMIT_BITS,
            genesis_reward: GENESIS_REWARD,
            genesis_bits: GENESIS_BITS,
            genesis_timestamp: GENESIS_TIMESTAMP,
        }
    }
}

impl ConsensusParams {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_block_size == 0 {
            return Err(ConfigError::Invalid("max_block_size must be positive".to_string()));
        }
        let limit = Target::from_compact(self.pow_limit_bits)
            .map_err(|e| ConfigError::Invalid(format!("pow_limit_bits: {}", e)))?;
        let genesis = Target::from_compact(self.genesis_bits)
            .map_err(|e| ConfigError::Invalid(format!("genesis_bits: {}", e)))?;
        if genesis > limit {
            return Err(ConfigError::Invalid(
                "genesis_bits is easier than pow_limit_bits".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let params = ConsensusParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.max_block_size, MAX_BLOCK_SIZE);
        assert_eq!(params.genesis_reward, 50_000_000);
    }

    #[test]
    fn test_partial_override() {
        let params = ConsensusParams::from_json_str(r#"{ "max_block_size": 4096 }"#).unwrap();
        assert_eq!(params.max_block_size, 4096);
        assert_eq!(params.max_future_block_time, MAX_FUTURE_BLOCK_TIME);
    }

    #[test]
    fn test_rejects_bad_targets() {
        let result = ConsensusParams::from_json_str(r#"{ "genesis_bits": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = ConsensusParams::from_json_str(r#"{ "pow_limit_bits": 486604799 }"#);
        // 0x1d00ffff limit is harder than the default genesis target
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            ConsensusParams::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_future_block_time": 60 }}"#).unwrap();
        let params = ConsensusParams::load(file.path()).unwrap();
        assert_eq!(params.max_future_block_time, 60);
    }

    #[test]
    fn test_missing_file() {
        let result = ConsensusParams::load("/nonexistent/params.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
