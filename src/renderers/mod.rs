//! Renderers module for the score engine
//!
//! Layout only: positions for measures, beats and notes. Drawing is left to
//! whoever consumes the [`LayoutResult`].

pub mod config;
pub mod layout;
pub mod layout_engine;

// Re-export commonly used types
pub use config::{DensityMode, DensityPreset, RenderConfig};
pub use layout::{BeatLayout, LayoutResult, MeasureLayout, NoteLayout, SystemLayout};
pub use layout_engine::LayoutEngine;
