//! Gateway: the HTTP surface of git-archiver.
//!
//! Request lifecycle for `GET /archive`:
//! 1. Check the bearer token and validate query parameters
//! 2. Write the worker script and pick an artifact name
//! 3. Wait for an admission slot, then create, start and wait on a worker
//!    container (blocking calls run on a bounded pool)
//! 4. Release the slot, remove the container, and stream the archive
//!
//! Every exit path removes the container before deleting the artifact, and
//! a client disconnect at any point still runs that cleanup.

pub mod admission;
pub mod archive_routes;
pub mod auth_middleware;
pub mod cleanup;
pub mod error;
pub mod job;
pub mod jobs;
#[cfg(feature = "metrics")]
pub mod metrics_middleware;
#[cfg(feature = "prometheus")]
pub mod metrics_routes;
pub mod responder;
pub mod server;
pub mod state;

pub use {
    error::ArchiveError,
    server::{AppState, build_gateway_app, build_jobs, start_gateway},
    state::GatewayState,
};
