//! Container-runtime sandbox (`docker`/`podman` CLI).

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, warn, Instrument};

use crate::obs::LogContext;

use super::config::SandboxConfig;
use super::error::{SandboxError, SandboxResult};
use super::exec::{run_command, ExecOutput};
use super::manager::{SandboxHandle, SandboxManager};

/// Sandbox manager driving a container runtime CLI.
pub struct ContainerSandboxManager {
    config: SandboxConfig,
    log: LogContext,
}

impl ContainerSandboxManager {
    pub fn new(config: SandboxConfig, log: LogContext) -> SandboxResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            log: log.component("sandbox"),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Arguments for starting a detached container named `name`.
    pub fn run_args(&self, name: &str, host_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "-v".to_string(),
            format!("{}:{}:rw", host_dir.display(), self.config.mount_path),
            "-w".to_string(),
            self.config.mount_path.clone(),
            self.config.image.clone(),
        ];
        args.extend(self.config.keepalive_command.iter().cloned());
        args
    }

    /// Arguments for running `argv` inside `handle`.
    pub fn exec_args(&self, handle: &SandboxHandle, argv: &[String]) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "-w".to_string(),
            handle.mount_path.clone(),
            handle.id.clone(),
        ];
        args.extend(argv.iter().cloned());
        args
    }

    /// Arguments for copying a host file into `handle`.
    pub fn copy_args(&self, handle: &SandboxHandle, host_path: &Path, sandbox_path: &str) -> Vec<String> {
        vec![
            "cp".to_string(),
            host_path.display().to_string(),
            format!("{}:{}", handle.id, sandbox_path),
        ]
    }

    fn runtime_argv(&self, args: Vec<String>) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.config.runtime.clone());
        argv.extend(args);
        argv
    }

    fn acquire_error(&self, reason: impl Into<String>) -> SandboxError {
        SandboxError::Acquire {
            image: self.config.image.clone(),
            reason: reason.into(),
        }
    }

    async fn acquire_inner(&self) -> SandboxResult<SandboxHandle> {
        let host_dir = std::fs::canonicalize(&self.config.host_dir).map_err(|e| {
            self.acquire_error(format!(
                "cannot resolve host dir {}: {e}",
                self.config.host_dir.display()
            ))
        })?;
        let short = uuid::Uuid::new_v4().simple().to_string();
        let name = format!("selfpatch-{}", &short[..12]);

        let argv = self.runtime_argv(self.run_args(&name, &host_dir));
        debug!(container = %name, "starting sandbox");

        let started = run_command(&argv, self.config.start_timeout_ms).await;
        let output = match started {
            Ok(out) if out.success() => out,
            Ok(out) => {
                self.remove_by_name(&name).await;
                return Err(self.acquire_error(format!(
                    "{} run exited {}: {}",
                    self.config.runtime,
                    out.exit_code,
                    out.combined()
                )));
            }
            Err(err) => {
                self.remove_by_name(&name).await;
                return Err(self.acquire_error(err.to_string()));
            }
        };

        let id = output.stdout.trim().to_string();
        if id.is_empty() {
            self.remove_by_name(&name).await;
            return Err(self.acquire_error("runtime returned no container id"));
        }

        info!(container = %name, id = %short_id(&id), image = %self.config.image, "sandbox acquired");
        Ok(SandboxHandle {
            id,
            name,
            host_dir,
            mount_path: self.config.mount_path.clone(),
        })
    }

    /// Best-effort removal of a container that may or may not exist.
    async fn remove_by_name(&self, name: &str) {
        let argv = self.runtime_argv(vec!["rm".to_string(), "-f".to_string(), name.to_string()]);
        match run_command(&argv, self.config.start_timeout_ms).await {
            Ok(out) if out.success() => debug!(container = %name, "removed partial sandbox"),
            Ok(out) => debug!(container = %name, output = %out.combined(), "nothing to remove"),
            Err(err) => warn!(container = %name, error = %err, "cleanup of partial sandbox failed"),
        }
    }

    async fn release_inner(&self, handle: &SandboxHandle) {
        let target = if handle.id.is_empty() {
            handle.name.clone()
        } else {
            handle.id.clone()
        };

        let stop = self.runtime_argv(vec![
            "stop".to_string(),
            "-t".to_string(),
            self.config.stop_grace_secs.to_string(),
            target.clone(),
        ]);
        match run_command(&stop, self.config.start_timeout_ms).await {
            Ok(out) if !out.success() => {
                warn!(container = %handle.name, output = %out.combined(), "sandbox stop failed")
            }
            Err(err) => warn!(container = %handle.name, error = %err, "sandbox stop failed"),
            Ok(_) => {}
        }

        let remove = self.runtime_argv(vec!["rm".to_string(), "-f".to_string(), target]);
        match run_command(&remove, self.config.start_timeout_ms).await {
            Ok(out) if !out.success() => {
                warn!(container = %handle.name, output = %out.combined(), "sandbox remove failed")
            }
            Err(err) => warn!(container = %handle.name, error = %err, "sandbox remove failed"),
            Ok(_) => info!(container = %handle.name, "sandbox released"),
        }
    }
}

fn short_id(id: &str) -> &str {
    &id[..12.min(id.len())]
}

#[async_trait]
impl SandboxManager for ContainerSandboxManager {
    async fn acquire(&self) -> SandboxResult<SandboxHandle> {
        self.acquire_inner().instrument(self.log.span()).await
    }

    async fn exec(&self, handle: &SandboxHandle, argv: &[String]) -> SandboxResult<ExecOutput> {
        let full = self.runtime_argv(self.exec_args(handle, argv));
        async {
            debug!(container = %handle.name, command = %argv.join(" "), "exec");
            run_command(&full, self.config.exec_timeout_ms).await
        }
        .instrument(self.log.span())
        .await
    }

    async fn copy_in(
        &self,
        handle: &SandboxHandle,
        host_path: &Path,
        sandbox_path: &str,
    ) -> SandboxResult<()> {
        let argv = self.runtime_argv(self.copy_args(handle, host_path, sandbox_path));
        let out = run_command(&argv, self.config.exec_timeout_ms)
            .instrument(self.log.span())
            .await?;
        if out.success() {
            Ok(())
        } else {
            Err(SandboxError::Copy {
                sandbox: handle.name.clone(),
                reason: out.combined(),
            })
        }
    }

    async fn release(&self, handle: &SandboxHandle) {
        self.release_inner(handle).instrument(self.log.span()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn manager(config: SandboxConfig) -> ContainerSandboxManager {
        ContainerSandboxManager::new(config, LogContext::default()).unwrap()
    }

    fn handle() -> SandboxHandle {
        SandboxHandle {
            id: "0123456789abcdef".to_string(),
            name: "selfpatch-test".to_string(),
            host_dir: PathBuf::from("/work"),
            mount_path: "/app".to_string(),
        }
    }

    #[test]
    fn test_run_args_mount_read_write_at_fixed_path() {
        let m = manager(SandboxConfig::default());
        let args = m.run_args("selfpatch-x", Path::new("/work/repo"));

        assert_eq!(&args[..4], &["run", "-d", "--name", "selfpatch-x"]);
        let v = args.iter().position(|a| a == "-v").expect("-v present");
        assert_eq!(args[v + 1], "/work/repo:/app:rw");
        let w = args.iter().position(|a| a == "-w").expect("-w present");
        assert_eq!(args[w + 1], "/app");

        let image = args
            .iter()
            .position(|a| a == "self-improve-agent")
            .expect("image present");
        assert!(image > v && image > w, "flags must precede image");
        assert_eq!(&args[image + 1..], &["sleep", "infinity"]);
    }

    #[test]
    fn test_run_args_without_keepalive_end_at_image() {
        let mut cfg = SandboxConfig::default();
        cfg.keepalive_command.clear();
        let m = manager(cfg);
        let args = m.run_args("n", Path::new("/w"));
        assert_eq!(args.last().map(String::as_str), Some("self-improve-agent"));
    }

    #[test]
    fn test_exec_and_copy_args() {
        let m = manager(SandboxConfig::default());
        let h = handle();
        let exec = m.exec_args(&h, &["git".to_string(), "apply".to_string()]);
        assert_eq!(exec, vec!["exec", "-w", "/app", "0123456789abcdef", "git", "apply"]);

        let cp = m.copy_args(&h, Path::new("/tmp/p.diff"), "/tmp/selfpatch.patch");
        assert_eq!(cp, vec!["cp", "/tmp/p.diff", "0123456789abcdef:/tmp/selfpatch.patch"]);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let cfg = SandboxConfig::default().with_image("");
        assert!(ContainerSandboxManager::new(cfg, LogContext::default()).is_err());
    }

    #[tokio::test]
    async fn test_missing_runtime_is_acquire_error() {
        let mut cfg = SandboxConfig::default();
        cfg.runtime = "/nonexistent/container-runtime".to_string();
        let m = manager(cfg);
        match m.acquire().await {
            Err(SandboxError::Acquire { image, .. }) => assert_eq!(image, "self-improve-agent"),
            other => panic!("expected Acquire error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_never_fails_without_runtime() {
        let mut cfg = SandboxConfig::default();
        cfg.runtime = "/nonexistent/container-runtime".to_string();
        let m = manager(cfg);
        // Must not panic or error even though nothing can be reached.
        m.release(&handle()).await;
    }
}
