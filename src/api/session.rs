//! Editing session exposed to JavaScript
//!
//! One [`ScoreSession`] owns one score, its history, an import pipeline and
//! a cache of earlier imports keyed by content.
//! The `*_inner` style methods hold the logic and return [`SessionError`];
//! the `#[wasm_bindgen]` methods only convert at the boundary.

use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::prelude::*;

use super::helpers::{deserialize, deserialize_or_default, js_error, serialize};
use crate::config::ConfigError;
use crate::converters::json::to_json;
use crate::converters::midi::{to_smf, MidiExportError};
use crate::converters::musicxml::{to_musicxml, ExportError};
use crate::converters::ImportError;
use crate::diagnostics::{validate_score, Diagnostics};
use crate::import::{with_file_title, CacheStats, ImportCache, ImportOptions, ImportPipeline};
use crate::models::Score;
use crate::renderers::{LayoutEngine, LayoutResult, RenderConfig};
use crate::undo::{Command, EditError, UndoStack};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    MusicXml(#[from] ExportError),

    #[error(transparent)]
    Midi(#[from] MidiExportError),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Summary returned to JavaScript after an import
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub title: String,
    pub track_count: usize,
    pub measure_count: usize,
    pub warnings: Vec<String>,
}

#[wasm_bindgen]
pub struct ScoreSession {
    score: Score,
    history: UndoStack,
    pipeline: ImportPipeline,
    cache: ImportCache,
}

impl Default for ScoreSession {
    fn default() -> Self {
        Self::with_options(ImportOptions::default())
    }
}

impl ScoreSession {
    pub fn with_options(options: ImportOptions) -> Self {
        Self {
            score: Score::blank("Untitled", 1, 4),
            history: UndoStack::default(),
            pipeline: ImportPipeline::with_options(options),
            cache: ImportCache::new(),
        }
    }

    /// Session whose import options come from a JSON document
    pub fn from_options_json(text: &str) -> Result<Self, SessionError> {
        Ok(Self::with_options(ImportOptions::from_json_str(text)?))
    }

    /// Swap the import options; cached imports made under the old ones are
    /// no longer served
    pub fn set_options(&mut self, options: ImportOptions) {
        self.pipeline = ImportPipeline::with_options(options);
        self.cache.bump_version();
    }

    pub fn set_options_json(&mut self, text: &str) -> Result<(), SessionError> {
        self.set_options(ImportOptions::from_json_str(text)?);
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    /// Replace the document with imported content; history starts over
    pub fn import_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<ImportSummary, SessionError> {
        let pipeline = &self.pipeline;
        let result = self.cache.get_or_import(bytes, |content| pipeline.import(content));
        let (score, warnings) = with_file_title(name, result).into_result()?;
        self.score = score;
        self.history.clear();
        Ok(ImportSummary {
            title: self.score.title.clone(),
            track_count: self.score.tracks.len(),
            measure_count: self.score.measure_count(),
            warnings,
        })
    }

    pub fn apply(&mut self, command: Command) -> Result<(), SessionError> {
        self.score = self.history.execute(command, &self.score)?;
        Ok(())
    }

    /// Step back; false when there is nothing to undo
    pub fn step_back(&mut self) -> Result<bool, SessionError> {
        match self.history.undo(&self.score)? {
            Some(previous) => {
                self.score = previous;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Step forward; false when there is nothing to redo
    pub fn step_forward(&mut self) -> Result<bool, SessionError> {
        match self.history.redo(&self.score)? {
            Some(next) => {
                self.score = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn compute_layout(&self, config: &RenderConfig) -> LayoutResult {
        LayoutEngine::new().compute_layout(&self.score, config)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        validate_score(&self.score)
    }
}

#[wasm_bindgen]
impl ScoreSession {
    /// New session; `options` is an import options object or undefined
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<ScoreSession, JsValue> {
        let options: ImportOptions = deserialize_or_default(options, "Invalid import options")?;
        Ok(Self::with_options(options))
    }

    /// Replace the import options with a JSON options document
    #[wasm_bindgen(js_name = setOptions)]
    pub fn set_options_js(&mut self, json: &str) -> Result<(), JsValue> {
        self.set_options_json(json).map_err(js_error)
    }

    #[wasm_bindgen(js_name = cacheStats)]
    pub fn cache_stats_js(&self) -> Result<JsValue, JsValue> {
        serialize(&self.cache_stats(), "Failed to serialize cache stats")
    }

    /// Import a file's bytes, auto-detecting its format
    #[wasm_bindgen(js_name = import)]
    pub fn import_js(&mut self, name: &str, bytes: &[u8]) -> Result<JsValue, JsValue> {
        let summary = self.import_bytes(name, bytes).map_err(js_error)?;
        serialize(&summary, "Failed to serialize import summary")
    }

    #[wasm_bindgen(js_name = toJson)]
    pub fn to_json(&self) -> Result<String, JsValue> {
        to_json(&self.score).map_err(js_error)
    }

    /// Apply an edit command (serialized `Command`)
    #[wasm_bindgen(js_name = execute)]
    pub fn execute_js(&mut self, command: JsValue) -> Result<(), JsValue> {
        let command: Command = deserialize(command, "Invalid command")?;
        self.apply(command).map_err(js_error)
    }

    pub fn undo(&mut self) -> Result<bool, JsValue> {
        self.step_back().map_err(js_error)
    }

    pub fn redo(&mut self) -> Result<bool, JsValue> {
        self.step_forward().map_err(js_error)
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Layout for the current document; `config` may be undefined
    pub fn layout(&self, config: JsValue) -> Result<JsValue, JsValue> {
        let config: RenderConfig = deserialize_or_default(config, "Invalid render config")?;
        serialize(&self.compute_layout(&config), "Failed to serialize layout")
    }

    #[wasm_bindgen(js_name = exportMusicXml)]
    pub fn export_musicxml(&self) -> Result<String, JsValue> {
        to_musicxml(&self.score).map_err(js_error)
    }

    #[wasm_bindgen(js_name = exportMidi)]
    pub fn export_midi(&self) -> Result<Vec<u8>, JsValue> {
        to_smf(&self.score).map_err(js_error)
    }

    pub fn validate(&self) -> Result<JsValue, JsValue> {
        serialize(&self.diagnostics(), "Failed to serialize diagnostics")
    }

    #[wasm_bindgen(getter)]
    pub fn title(&self) -> String {
        self.score.title.clone()
    }
}
