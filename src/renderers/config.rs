//! Render configuration
//!
//! A [`DensityMode`] selects a [`DensityPreset`]: spacing constants, font
//! size, measures per line and the dense-beat policy. Page geometry lives on
//! [`RenderConfig`] itself.

use serde::{Deserialize, Serialize};

use crate::config::{self, ConfigError};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DensityMode {
    Compact,
    #[default]
    Comfortable,
    Spacious,
}

/// Spacing constants for one density mode
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DensityPreset {
    /// Width of an eighth note column before gaps
    pub note_spacing: f32,
    /// Gap after a beat beamed to its successor
    pub beamed_gap: f32,
    /// Gap after a free-standing beat
    pub group_gap: f32,
    /// Space after the barline and before the next one
    pub measure_padding: f32,
    /// Width of a measure with no beats
    pub empty_measure_width: f32,
    pub font_size: f32,
    /// Distance between staff lines
    pub line_spacing: f32,
    pub max_measures_per_line: usize,
    /// Beats with more notes than this are drawn reduced
    pub dense_beat_threshold: usize,
    pub dense_font_scale: f32,
    pub dense_spacing_scale: f32,
}

impl DensityPreset {
    pub fn for_mode(mode: DensityMode) -> Self {
        match mode {
            DensityMode::Compact => Self {
                note_spacing: 18.0,
                beamed_gap: 2.0,
                group_gap: 6.0,
                measure_padding: 8.0,
                empty_measure_width: 60.0,
                font_size: 14.0,
                line_spacing: 7.0,
                max_measures_per_line: 6,
                dense_beat_threshold: 3,
                dense_font_scale: 0.75,
                dense_spacing_scale: 0.8,
            },
            DensityMode::Comfortable => Self {
                note_spacing: 24.0,
                beamed_gap: 4.0,
                group_gap: 10.0,
                measure_padding: 12.0,
                empty_measure_width: 80.0,
                font_size: 18.0,
                line_spacing: 9.0,
                max_measures_per_line: 4,
                dense_beat_threshold: 4,
                dense_font_scale: 0.8,
                dense_spacing_scale: 0.85,
            },
            DensityMode::Spacious => Self {
                note_spacing: 32.0,
                beamed_gap: 6.0,
                group_gap: 16.0,
                measure_padding: 16.0,
                empty_measure_width: 100.0,
                font_size: 22.0,
                line_spacing: 11.0,
                max_measures_per_line: 3,
                dense_beat_threshold: 5,
                dense_font_scale: 0.85,
                dense_spacing_scale: 0.9,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    pub density: DensityMode,
    pub page_width: f32,
    pub left_margin: f32,
    pub right_margin: f32,
    pub top_margin: f32,
    /// Vertical space between two staves of one system
    pub staff_gap: f32,
    /// Vertical space between systems
    pub system_gap: f32,
    /// Stretch full lines to the available width
    pub justify: bool,
    /// Replaces the mode's preset when set
    pub preset_override: Option<DensityPreset>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            density: DensityMode::default(),
            page_width: 1000.0,
            left_margin: 40.0,
            right_margin: 40.0,
            top_margin: 60.0,
            staff_gap: 48.0,
            system_gap: 64.0,
            justify: true,
            preset_override: None,
        }
    }
}

impl RenderConfig {
    pub fn with_density(mut self, density: DensityMode) -> Self {
        self.density = density;
        self
    }

    pub fn preset(&self) -> DensityPreset {
        self.preset_override
            .unwrap_or_else(|| DensityPreset::for_mode(self.density))
    }

    /// Horizontal space available to measures
    pub fn content_width(&self) -> f32 {
        (self.page_width - self.left_margin - self.right_margin).max(0.0)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        config::from_json::<Self>(text)?.validate()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        config::from_yaml::<Self>(text)?.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !(self.page_width > 0.0) {
            return Err(ConfigError::Invalid {
                field: "pageWidth",
                reason: "must be positive".into(),
            });
        }
        if self.preset().max_measures_per_line == 0 {
            return Err(ConfigError::Invalid {
                field: "presetOverride.maxMeasuresPerLine",
                reason: "must be at least 1".into(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes_are_distinct() {
        let compact = DensityPreset::for_mode(DensityMode::Compact);
        let comfortable = DensityPreset::for_mode(DensityMode::Comfortable);
        let spacious = DensityPreset::for_mode(DensityMode::Spacious);
        assert!(compact.note_spacing < comfortable.note_spacing);
        assert!(comfortable.note_spacing < spacious.note_spacing);
        assert!(compact.max_measures_per_line > spacious.max_measures_per_line);
    }

    #[test]
    fn test_load_json_and_yaml() {
        let config = RenderConfig::from_json_str(r#"{"density": "compact", "pageWidth": 600}"#).unwrap();
        assert_eq!(config.density, DensityMode::Compact);
        assert_eq!(config.page_width, 600.0);
        assert!(config.justify);

        let config = RenderConfig::from_yaml_str("density: spacious\njustify: false\n").unwrap();
        assert_eq!(config.preset(), DensityPreset::for_mode(DensityMode::Spacious));
        assert!(!config.justify);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(RenderConfig::from_json_str(r#"{"pageWidth": 0}"#).is_err());
        assert!(RenderConfig::from_json_str(r#"{"density": "huge"}"#).is_err());
    }
}
