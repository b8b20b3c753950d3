//! Configuration loading, validation, env substitution, and env overrides.
//!
//! Config files: `git-archiver.toml`, `git-archiver.yaml`, or `git-archiver.json`
//! Searched in `./` then `~/.config/git-archiver/`.
//!
//! Supports `${ENV_VAR}` substitution in the raw file, and the
//! `GIT_ARCHIVER_*` variables override individual values after parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{ArchiveConfig, ArchiverConfig, MetricsConfig, ServerConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
