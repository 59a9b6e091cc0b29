//! Configuration for engines and position-key generation.
//!
//! Both configs are plain serde structs with defaults for every field, so a
//! host can load them from JSON with only the fields it cares about.
//!
//! ```
//! use wavestate::{EngineConfig, PositionConfig};
//!
//! let config = EngineConfig::from_json(r#"{ "throttle_delay_ms": 250 }"#).unwrap();
//! assert_eq!(config.throttle_delay_ms, Some(250));
//! assert_eq!(config.id_length, 5);
//!
//! let positions = PositionConfig::default().with_chance(1000);
//! assert!(positions.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    constants::{DEFAULT_CHANCE, DEFAULT_ID_LENGTH, DEFAULT_MAX_CODE, DEFAULT_MIN_CODE},
    engine::EngineError,
    list::ListError,
};

/// Settings for a replication [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When set, changes made outside an explicit buffer scope are held for
    /// this many milliseconds and flushed together by
    /// [`Engine::poll_throttle`](crate::Engine::poll_throttle).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_delay_ms: Option<u64>,
    /// Length of generated object ids. Both sides of a transport must agree.
    pub id_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            throttle_delay_ms: None,
            id_length: DEFAULT_ID_LENGTH,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the throttle delay.
    pub fn with_throttle_delay_ms(mut self, delay: u64) -> Self {
        self.throttle_delay_ms = Some(delay);
        self
    }

    /// Set the generated id length.
    pub fn with_id_length(mut self, id_length: usize) -> Self {
        self.id_length = id_length;
        self
    }

    /// Check that the config can produce decodable flat keys.
    pub fn validate(&self) -> Result<()> {
        if self.id_length == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "id_length must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Settings for position-key generation in an [`OrderedList`](crate::OrderedList).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    /// Lowest character code a generated key may contain.
    pub min_code: u32,
    /// Highest character code a generated key may contain.
    pub max_code: u32,
    /// Target collision-probability denominator: two keys generated
    /// independently under the same bounds collide with odds below `1/chance`.
    pub chance: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            min_code: DEFAULT_MIN_CODE,
            max_code: DEFAULT_MAX_CODE,
            chance: DEFAULT_CHANCE,
        }
    }
}

impl PositionConfig {
    /// Parse a config from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the character range.
    pub fn with_codes(mut self, min_code: u32, max_code: u32) -> Self {
        self.min_code = min_code;
        self.max_code = max_code;
        self
    }

    /// Set the collision-probability denominator.
    pub fn with_chance(mut self, chance: u64) -> Self {
        self.chance = chance;
        self
    }

    /// Check the alphabet is usable.
    ///
    /// Keys must stay within ASCII, and the alphabet needs at least three
    /// codes so padding characters can always grow the key space.
    pub fn validate(&self) -> std::result::Result<(), ListError> {
        if self.max_code > DEFAULT_MAX_CODE {
            return Err(ListError::InvalidAlphabet {
                reason: format!("max_code {} is outside ASCII", self.max_code),
            });
        }
        if self.min_code + 1 >= self.max_code {
            return Err(ListError::InvalidAlphabet {
                reason: format!(
                    "range {}..={} needs at least three codes",
                    self.min_code, self.max_code
                ),
            });
        }
        if self.chance == 0 {
            return Err(ListError::InvalidAlphabet {
                reason: "chance must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
