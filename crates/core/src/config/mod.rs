use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LamplightError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub narration: NarrationConfig,
    pub render: RenderConfig,
    pub host: HostConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate must be positive"));
        }
        if audio.block_size == 0 {
            return Err(invalid("audio.block_size must be positive"));
        }
        if !(0.0..=1.0).contains(&audio.volume) {
            return Err(invalid(format!(
                "audio.volume must lie in [0, 1], got {}",
                audio.volume
            )));
        }
        if !(audio.swell_period_seconds > 0.0) {
            return Err(invalid("audio.swell_period_seconds must be positive"));
        }
        if self.narration.language.trim().is_empty() {
            return Err(invalid("narration.language must not be empty"));
        }
        if !(self.render.max_device_pixel_ratio >= 1.0) {
            return Err(invalid("render.max_device_pixel_ratio must be at least 1"));
        }
        if !(self.host.frame_interval_ms > 0.0) {
            return Err(invalid("host.frame_interval_ms must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> LamplightError {
    LamplightError::InvalidConfig(msg.into())
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Master bus level in `[0, 1]`.
    pub volume: f32,
    /// Seed for the pad and swell randomness. `None` draws from entropy.
    pub seed: Option<u64>,
    pub swell_period_seconds: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
            volume: 0.14,
            seed: None,
            swell_period_seconds: 9.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// BCP 47 tag of the narration language, e.g. `hi-IN`.
    pub language: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            language: "hi-IN".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub max_device_pixel_ratio: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_device_pixel_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub frame_interval_ms: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 1000.0 / 60.0,
        }
    }
}
