//! Core types and error handling for the rlprep data-preparation framework.
//!
//! This crate provides the foundational pieces shared by the rlprep crates:
//!
//! - Error handling infrastructure (`RlprepError`, `Result`)
//! - A prelude for convenient imports

#![warn(missing_docs)]

mod error;

pub use error::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, RlprepError};
}
