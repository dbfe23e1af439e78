//! # fragkit Common Library
//!
//! Shared code for the fragkit crates:
//! - Error and result types
//! - Configuration loading and resolution
//! - Fragment response framing (encode/decode)

pub mod config;
pub mod error;
pub mod framing;

pub use error::{Error, Result};
pub use framing::{FragmentRecord, FramingError};
