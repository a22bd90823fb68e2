//! Score engine WASM API
//!
//! The only module that touches JavaScript types. Everything here delegates
//! to plain Rust in the rest of the crate.
//!
//! # Module Structure
//!
//! - `helpers`: serialization across the boundary and error conversion
//! - `session`: [`ScoreSession`], one document with history and import

pub mod helpers;
pub mod session;

pub use session::{ImportSummary, ScoreSession, SessionError};
