//! Core definitions (error type, result alias and verification helpers), relied upon
//! by all strata-* crates.

pub mod error;
pub mod result;

pub use error::{Error, ErrorCategory, ErrorKind};
pub use result::Result;
