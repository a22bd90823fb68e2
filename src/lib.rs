//! Score Engine WASM Module
//!
//! Music notation core: a score document model, bounded undo/redo, importers
//! for MIDI, JSON, MusicXML and Jianpu behind one auto-detecting pipeline,
//! exporters, and a deterministic layout engine.

pub mod api;
pub mod config;
pub mod converters;
pub mod diagnostics;
pub mod import;
pub mod models;
pub mod parse;
pub mod renderers;
pub mod storage;
pub mod undo;

// Re-export commonly used types
pub use config::ConfigError;
pub use converters::{ImportError, ImportFormat, ImportResult, SheetParser};
pub use import::{ImportOptions, ImportPipeline};
pub use models::core::*;
pub use models::elements::*;
pub use models::notation::*;
pub use renderers::{LayoutEngine, LayoutResult, RenderConfig};
pub use undo::{Command, UndoStack};

#[cfg(all(target_arch = "wasm32", feature = "console"))]
use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[cfg(all(target_arch = "wasm32", feature = "console"))]
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Debug).is_err() {
        return;
    }

    log::info!("Score engine WASM module initialized");
}
