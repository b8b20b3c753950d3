//! Worker container lifecycle: create, start, wait with timeout, collect
//! logs, and force-remove.
//!
//! Backends implement [`SandboxRuntime`] with plain blocking calls. Callers on
//! the async side never invoke those directly; they go through
//! [`SandboxClient`], which dispatches every call onto a bounded
//! [`BlockingPool`] so request handling is never stalled on container I/O.

pub mod client;
pub mod docker;
pub mod error;
pub mod pool;
pub mod runtime;

pub use {
    client::SandboxClient,
    docker::DockerCli,
    error::{PoolError, SandboxError},
    pool::BlockingPool,
    runtime::{Mount, SandboxHandle, SandboxRuntime, SandboxSpec, host_user},
};
