//! Context configuration.
//!
//! Usually built in code with the `with_*` setters, or read from a small
//! JSON document:
//!
//! ```json
//! { "environment": "csnd", "default_max_plays": 4 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::Environment;
use crate::error::{CwavError, Result};

/// Channels the DSP service can drive at most.
pub const MAX_DSP_CHANNELS: u32 = 24;

/// Settings fixed when a [`CwavContext`](crate::CwavContext) is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CwavConfig {
    /// Sound service the context plays through.
    pub environment: Environment,
    /// Concurrent play slots of the `load_*_default` calls of
    /// [`CwavContext`](crate::CwavContext).
    pub default_max_plays: u32,
    /// Size of the DSP channel pool.
    pub dsp_channel_count: u32,
}

impl Default for CwavConfig {
    fn default() -> Self {
        let environment = if cfg!(feature = "dsp") {
            Environment::Dsp
        } else {
            Environment::Csnd
        };
        Self {
            environment,
            default_max_plays: 1,
            dsp_channel_count: MAX_DSP_CHANNELS,
        }
    }
}

impl CwavConfig {
    /// Override the sound service.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Override the default number of concurrent plays.
    pub fn with_default_max_plays(mut self, plays: u32) -> Self {
        self.default_max_plays = plays;
        self
    }

    /// Override the DSP channel pool size.
    pub fn with_dsp_channel_count(mut self, count: u32) -> Self {
        self.dsp_channel_count = count;
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that the settings can be used on this build.
    pub fn validate(&self) -> Result<()> {
        if !self.environment.is_compiled_in() {
            return Err(CwavError::Config(format!(
                "{} support is not compiled in",
                self.environment
            )));
        }
        if self.default_max_plays == 0 {
            return Err(CwavError::Config(
                "default_max_plays must be at least 1".to_string(),
            ));
        }
        if self.dsp_channel_count == 0 || self.dsp_channel_count > MAX_DSP_CHANNELS {
            return Err(CwavError::Config(format!(
                "dsp_channel_count must be 1..={MAX_DSP_CHANNELS}, got {}",
                self.dsp_channel_count
            )));
        }
        Ok(())
    }
}
