//! Import options
//!
//! Loaded from JSON or YAML; every field has a default so partial documents
//! are accepted.

use serde::{Deserialize, Serialize};

use crate::config::{self, ConfigError};
use crate::converters::midi::{ClassifierThresholds, ClassifyOptions, ImportMode};

/// Grid choices for `quantize`, in subdivisions of a whole note
pub const QUANTIZE_CHOICES: [u32; 4] = [4, 8, 16, 32];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// Drop tracks with no notes or no pitch range before grouping
    pub skip_empty: bool,
    /// Drop tracks on the percussion channel
    pub remove_drums: bool,
    /// Snap grid; `None` keeps the finest supported grid
    pub quantize: Option<u32>,
    /// Estimate a key when the file declares none
    pub analyze_key: bool,
    pub thresholds: ClassifierThresholds,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::Smart,
            skip_empty: true,
            remove_drums: false,
            quantize: None,
            analyze_key: true,
            thresholds: ClassifierThresholds::default(),
        }
    }
}

impl ImportOptions {
    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        config::from_json::<Self>(text)?.validate()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        config::from_yaml::<Self>(text)?.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if let Some(q) = self.quantize {
            if !QUANTIZE_CHOICES.contains(&q) {
                return Err(ConfigError::Invalid {
                    field: "quantize",
                    reason: format!("{} is not one of {:?}", q, QUANTIZE_CHOICES),
                });
            }
        }
        if self.thresholds.max_voices == 0 {
            return Err(ConfigError::Invalid {
                field: "thresholds.maxVoices",
                reason: "must be at least 1".into(),
            });
        }
        Ok(self)
    }

    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            mode: self.mode,
            skip_empty: self.skip_empty,
            remove_drums: self.remove_drums,
            thresholds: self.thresholds,
        }
    }
}
