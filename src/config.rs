// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! Display configuration, read from TOML.
//!
//! Every key is optional, missing ones take the defaults below:
//!
//! ```toml
//! screen_width = 640
//! screen_height = 480
//! default_buffer_size = 24576
//! auto_buffer_size = 1024
//! debug = false
//! default_filter = "linear"
//! line_width = 1.0
//! point_size = 1.0
//! log_level = "info"
//! # log_file = "log/gl2d.log"
//! ```

use crate::render::backend::FilterMode;
use crate::render::buffer::DEFAULT_BUFFER_SIZE;
use crate::render::error::{DisplayError, DisplayResult};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// vertex capacity of the default buffer
    pub default_buffer_size: usize,
    /// starting capacity of growable user buffers
    pub auto_buffer_size: usize,
    pub debug: bool,
    /// filter given to new surfaces
    pub default_filter: FilterMode,
    pub line_width: f32,
    pub point_size: f32,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            screen_width: 640,
            screen_height: 480,
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            auto_buffer_size: 1024,
            debug: false,
            default_filter: FilterMode::Linear,
            line_width: 1.0,
            point_size: 1.0,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl DisplayConfig {
    pub fn from_toml_str(s: &str) -> DisplayResult<Self> {
        let cfg: DisplayConfig =
            toml::from_str(s).map_err(|e| DisplayError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &str) -> DisplayResult<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn to_toml_string(&self) -> DisplayResult<String> {
        toml::to_string(self).map_err(|e| DisplayError::Config(e.to_string()))
    }

    pub fn validate(&self) -> DisplayResult<()> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(DisplayError::InvalidSize(
                self.screen_width as i64,
                self.screen_height as i64,
            ));
        }
        if self.default_buffer_size == 0 || self.auto_buffer_size == 0 {
            return Err(DisplayError::Config("buffer sizes must be > 0".to_string()));
        }
        let bad = |v: f32| v < 0.0 || v.is_nan();
        if bad(self.line_width) || bad(self.point_size) {
            return Err(DisplayError::Config(
                "line_width and point_size must be >= 0".to_string(),
            ));
        }
        self.level_filter()?;
        Ok(())
    }

    /// `log_level` as a log filter
    pub fn level_filter(&self) -> DisplayResult<LevelFilter> {
        self.log_level
            .parse::<LevelFilter>()
            .map_err(|_| DisplayError::Config(format!("unknown log level {}", self.log_level)))
    }
}

/// Global display configuration, set once at startup
pub static DISPLAY_CONFIG: OnceLock<DisplayConfig> = OnceLock::new();

/// Sets the global configuration. Returns false if it was already set.
pub fn init_display_config(cfg: DisplayConfig) -> bool {
    DISPLAY_CONFIG.set(cfg).is_ok()
}

/// Global configuration, defaults if never initialised
pub fn get_display_config() -> &'static DisplayConfig {
    DISPLAY_CONFIG.get_or_init(DisplayConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_default() {
        let c = DisplayConfig::from_toml_str("screen_width = 320\ndebug = true\n").unwrap();
        assert_eq!(c.screen_width, 320);
        assert_eq!(c.screen_height, 480);
        assert!(c.debug);
        assert_eq!(c.default_filter, FilterMode::Linear);
        assert_eq!(c.log_file, None);
    }

    #[test]
    fn test_filter_names() {
        let c = DisplayConfig::from_toml_str("default_filter = \"trilinear\"").unwrap();
        assert_eq!(c.default_filter, FilterMode::Trilinear);
        assert!(DisplayConfig::from_toml_str("default_filter = \"cubic\"").is_err());
    }

    #[test]
    fn test_invalid_values() {
        assert!(DisplayConfig::from_toml_str("screen_width = 0").is_err());
        assert!(DisplayConfig::from_toml_str("line_width = -2.0").is_err());
        assert!(DisplayConfig::from_toml_str("log_level = \"loud\"").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let c = DisplayConfig {
            log_file: Some("gl2d.log".to_string()),
            ..Default::default()
        };
        let s = c.to_toml_string().unwrap();
        assert_eq!(DisplayConfig::from_toml_str(&s).unwrap(), c);
    }
}
