//! Models module for the score engine
//!
//! This module contains the document model (score, tracks, measures, beats,
//! notes), its element types and the position types used to address it.

pub mod core;
pub mod elements;
pub mod notation;
pub mod pitch;

// Re-export commonly used types
pub use self::core::*;
pub use elements::*;
pub use notation::{Position, Selection};
