//! Sandbox: isolated, disposable environments bound to the working tree.
//!
//! A sandbox is a container started from a pre-built image with the host
//! working tree bind-mounted read-write at a fixed path. Every acquired
//! sandbox must be released on every exit path; [`with_sandbox`] enforces
//! that for scoped use.
//!
//! # Modules
//!
//! - [`config`]    — `SandboxConfig` (runtime, image, mount path, timeouts)
//! - [`manager`]   — `SandboxManager` trait, `SandboxHandle`, `with_sandbox()`
//! - [`container`] — `ContainerSandboxManager` (docker/podman CLI)
//! - [`exec`]      — `run_command()` with a hard timeout
//! - [`error`]     — `SandboxError` / `SandboxResult`

pub mod config;
pub mod container;
pub mod error;
pub mod exec;
pub mod manager;

pub use config::SandboxConfig;
pub use container::ContainerSandboxManager;
pub use error::{SandboxError, SandboxResult};
pub use exec::{run_command, ExecOutput};
pub use manager::{with_sandbox, SandboxHandle, SandboxManager};
