//! Sandbox lifecycle: acquire, run commands, release.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::error::SandboxResult;
use super::exec::ExecOutput;

/// Reference to a running isolated environment.
///
/// Cheap to clone; cloning does not create a second environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxHandle {
    /// Runtime-assigned identifier (container id).
    pub id: String,
    /// Name given at creation, used for cleanup when no id was obtained.
    pub name: String,
    /// Host directory bind-mounted into the sandbox.
    pub host_dir: PathBuf,
    /// Path of the mounted working tree inside the sandbox.
    pub mount_path: String,
}

impl SandboxHandle {
    /// Absolute in-sandbox path for a path relative to the mounted tree.
    pub fn path_in_mount(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.mount_path.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

/// Creates and tears down isolated environments bound to the working tree.
#[async_trait]
pub trait SandboxManager: Send + Sync {
    /// Start a fresh environment with the working tree mounted read-write.
    ///
    /// On failure nothing is left running.
    async fn acquire(&self) -> SandboxResult<SandboxHandle>;

    /// Run `argv` inside the sandbox, working directory = mount path.
    async fn exec(&self, handle: &SandboxHandle, argv: &[String]) -> SandboxResult<ExecOutput>;

    /// Copy a host file to `sandbox_path` inside the sandbox.
    async fn copy_in(
        &self,
        handle: &SandboxHandle,
        host_path: &Path,
        sandbox_path: &str,
    ) -> SandboxResult<()>;

    /// Stop and remove the environment.
    ///
    /// Best effort: safe on half-started or errored environments, secondary
    /// errors are logged and swallowed.
    async fn release(&self, handle: &SandboxHandle);
}

/// Acquire a sandbox, run `body`, and release the sandbox on every exit path.
///
/// `body`'s own output (typically a `Result`) is returned untouched, so a
/// primary error inside the body still reaches the caller. A panic inside the
/// body releases the sandbox before resuming the unwind.
pub async fn with_sandbox<M, F, Fut, T>(manager: &M, body: F) -> SandboxResult<T>
where
    M: SandboxManager + ?Sized,
    F: FnOnce(SandboxHandle) -> Fut,
    Fut: Future<Output = T>,
{
    let handle = manager.acquire().await?;
    let outcome = AssertUnwindSafe(body(handle.clone())).catch_unwind().await;
    manager.release(&handle).await;

    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_in_mount() {
        let handle = SandboxHandle {
            id: "abc".to_string(),
            name: "selfpatch-abc".to_string(),
            host_dir: PathBuf::from("/work"),
            mount_path: "/app/".to_string(),
        };
        assert_eq!(handle.path_in_mount("temp.patch"), "/app/temp.patch");
        assert_eq!(handle.path_in_mount("/src/x.py"), "/app/src/x.py");
    }
}
