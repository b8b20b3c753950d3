//! Shared error definitions used across the git-archiver crates.

pub mod error;

pub use error::{Error, FromMessage, Result};
