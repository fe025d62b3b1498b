//! Sandbox configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{SandboxError, SandboxResult};

/// Pre-built image carrying the agent toolchain.
pub const DEFAULT_IMAGE: &str = "self-improve-agent";
/// Fixed in-sandbox path of the bind-mounted working tree.
pub const DEFAULT_MOUNT_PATH: &str = "/app";

/// Configuration for container-backed sandboxes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container runtime CLI (`docker`, `podman`, ...).
    pub runtime: String,
    /// Pre-built image containing the project's runtime.
    pub image: String,
    /// Host working tree, bind-mounted read-write.
    pub host_dir: PathBuf,
    /// Absolute path the working tree is mounted at inside the sandbox.
    pub mount_path: String,
    /// Command that keeps a detached container alive. Empty = image default.
    pub keepalive_command: Vec<String>,
    /// Upper bound for starting the container (milliseconds).
    pub start_timeout_ms: u64,
    /// Upper bound for one command inside the container (milliseconds).
    pub exec_timeout_ms: u64,
    /// Grace period handed to `stop` before the runtime kills the container.
    pub stop_grace_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            image: DEFAULT_IMAGE.to_string(),
            host_dir: PathBuf::from("."),
            mount_path: DEFAULT_MOUNT_PATH.to_string(),
            keepalive_command: vec!["sleep".to_string(), "infinity".to_string()],
            start_timeout_ms: 120_000,
            exec_timeout_ms: 300_000,
            stop_grace_secs: 10,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> SandboxResult<()> {
        if self.runtime.trim().is_empty() {
            return Err(SandboxError::InvalidConfig("runtime must not be empty".into()));
        }
        if self.image.trim().is_empty() {
            return Err(SandboxError::InvalidConfig("image must not be empty".into()));
        }
        if !self.mount_path.starts_with('/') || self.mount_path == "/" {
            return Err(SandboxError::InvalidConfig(format!(
                "mount_path must be an absolute, non-root path (got {:?})",
                self.mount_path
            )));
        }
        Ok(())
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_host_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.host_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_config_default() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.runtime, "docker");
        assert_eq!(cfg.image, "self-improve-agent");
        assert_eq!(cfg.mount_path, "/app");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_relative_or_root_mount() {
        let mut cfg = SandboxConfig::default();
        cfg.mount_path = "app".to_string();
        assert!(cfg.validate().is_err());
        cfg.mount_path = "/".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_image() {
        let cfg = SandboxConfig::default().with_image("  ");
        assert!(matches!(cfg.validate(), Err(SandboxError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: SandboxConfig = toml::from_str("image = \"custom:latest\"").unwrap();
        assert_eq!(cfg.image, "custom:latest");
        assert_eq!(cfg.mount_path, "/app");
    }
}
