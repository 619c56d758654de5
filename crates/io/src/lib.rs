//! Read-only, memory-mapped access to text files of any size.
//!
//! - [`mmap::MappedFile`] maps a file once and hands out clamped byte slices.
//! - [`encoding`] decides how those bytes are to be read as text.
pub mod encoding;
pub mod errors;
pub mod mmap;
