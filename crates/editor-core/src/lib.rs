//! Large-file text engine: incremental line indexing over a mapped file, a
//! balanced rope for edits, and a line-oriented buffer that overlays those
//! edits on the untouched file bytes.
pub mod config;
pub mod errors;
pub mod line_index;
pub mod rope;
pub mod text;
