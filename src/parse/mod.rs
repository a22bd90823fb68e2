//! Jianpu (numbered notation) text grammar
//!
//! Turns source text into tokens and header fields. Building a score from
//! them lives in [`crate::converters::jianpu`].

pub mod grammar;
pub mod header;
pub mod tokens;

pub use grammar::{is_music_char, split_voice, tokenize_line, LexError, LineTokens};
pub use header::{parse_header_line, HeaderField, HeaderLine};
pub use tokens::*;
