//! Layered configuration.
//!
//! Resolution order, later layers win:
//! 1. built-in defaults
//! 2. TOML file (`--config`)
//! 3. `SELFPATCH_*` environment variables
//! 4. CLI flags (applied by the binary)
//!
//! API keys are never stored in the file layer by default; each backend falls
//! back to `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` when `backend.api_key` is
//! unset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendConfig, BackendKind};
use crate::domain::error::{Result, SelfPatchError};
use crate::eval::{EvaluationConfig, EvaluationMode};
use crate::sandbox::SandboxConfig;

/// What the driver does with a patch that fails structural validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPatchPolicy {
    /// Dump the patch for audit and attempt to apply it anyway.
    #[default]
    BestEffort,
    /// Dump the patch for audit and fail the cycle.
    FailFast,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfPatchConfig {
    /// Working tree the sandbox mounts.
    pub workdir: PathBuf,
    /// Where audit artifacts (patch files, reports, cycle summary) go.
    pub audit_dir: PathBuf,
    pub invalid_patch_policy: InvalidPatchPolicy,
    pub sandbox: SandboxConfig,
    pub backend: BackendConfig,
    pub evaluation: EvaluationConfig,
}

impl Default for SelfPatchConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            audit_dir: PathBuf::from("."),
            invalid_patch_policy: InvalidPatchPolicy::default(),
            sandbox: SandboxConfig::default(),
            backend: BackendConfig::default(),
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl SelfPatchConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.sync_workdir();
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| SelfPatchError::InvalidConfig(e.to_string()))
    }

    /// Apply `SELFPATCH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SELFPATCH_WORKDIR") {
            self.workdir = PathBuf::from(v);
        }
        if let Some(v) = get("SELFPATCH_AUDIT_DIR") {
            self.audit_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SELFPATCH_RUNTIME") {
            self.sandbox.runtime = v;
        }
        if let Some(v) = get("SELFPATCH_IMAGE") {
            self.sandbox.image = v;
        }
        if let Some(v) = get("SELFPATCH_BACKEND") {
            self.backend.kind = v
                .parse::<BackendKind>()
                .map_err(SelfPatchError::InvalidConfig)?;
        }
        if let Some(v) = get("SELFPATCH_MODEL") {
            self.backend.model = v;
        }
        if let Some(v) = get("SELFPATCH_BASE_URL") {
            self.backend.base_url = Some(v);
        }
        if let Some(v) = get("SELFPATCH_EVAL_MODE") {
            self.evaluation.mode = match v.to_ascii_lowercase().as_str() {
                "simulated" => EvaluationMode::Simulated,
                "harness" => EvaluationMode::Harness,
                other => {
                    return Err(SelfPatchError::InvalidConfig(format!(
                        "unknown eval mode '{other}' (expected simulated|harness)"
                    )))
                }
            };
        }
        if let Some(v) = get("SELFPATCH_SUBSET") {
            self.evaluation.subset = v;
        }
        if let Some(v) = get("SELFPATCH_SUBSETS_DIR") {
            self.evaluation.subsets_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SELFPATCH_NUM_INSTANCES") {
            self.evaluation.num_instances = parse_count("SELFPATCH_NUM_INSTANCES", &v)?;
        }
        if let Some(v) = get("SELFPATCH_MAX_WORKERS") {
            self.evaluation.max_workers = parse_count("SELFPATCH_MAX_WORKERS", &v)?;
        }
        Ok(())
    }

    /// The sandbox mounts the configured working tree.
    pub fn sync_workdir(&mut self) {
        self.sandbox.host_dir = self.workdir.clone();
    }

    pub fn validate(&self) -> Result<()> {
        self.sandbox
            .validate()
            .map_err(|e| SelfPatchError::InvalidConfig(e.to_string()))?;
        self.evaluation.validate()?;
        if self.backend.model.trim().is_empty() {
            return Err(SelfPatchError::InvalidConfig("backend.model must not be empty".into()));
        }
        if self.backend.max_tokens == 0 {
            return Err(SelfPatchError::InvalidConfig("backend.max_tokens must be >= 1".into()));
        }
        Ok(())
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| SelfPatchError::InvalidConfig(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let cfg = SelfPatchConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.invalid_patch_policy, InvalidPatchPolicy::BestEffort);
        assert_eq!(cfg.backend.model, "gpt-4o");
        assert_eq!(cfg.backend.max_tokens, 4096);
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let cfg = SelfPatchConfig::from_toml_str(
            r#"
            invalid_patch_policy = "fail_fast"

            [backend]
            kind = "anthropic"
            model = "claude-3-5-sonnet-20241022"

            [evaluation]
            subset = "medium"
            max_workers = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.invalid_patch_policy, InvalidPatchPolicy::FailFast);
        assert_eq!(cfg.backend.kind, BackendKind::Anthropic);
        assert_eq!(cfg.evaluation.subset, "medium");
        assert_eq!(cfg.evaluation.max_workers, 2);
        assert_eq!(cfg.evaluation.num_instances, 10);
        assert_eq!(cfg.sandbox.image, "self-improve-agent");
    }

    #[test]
    fn test_env_layer_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("SELFPATCH_BACKEND", "anthropic"),
            ("SELFPATCH_NUM_INSTANCES", "3"),
            ("SELFPATCH_EVAL_MODE", "harness"),
            ("SELFPATCH_IMAGE", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = SelfPatchConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.backend.kind, BackendKind::Anthropic);
        assert_eq!(cfg.evaluation.num_instances, 3);
        assert_eq!(cfg.evaluation.mode, EvaluationMode::Harness);
        // empty values are ignored
        assert_eq!(cfg.sandbox.image, "self-improve-agent");
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut cfg = SelfPatchConfig::default();
        let err = cfg
            .apply_env(|k| (k == "SELFPATCH_MAX_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SELFPATCH_MAX_WORKERS"));

        let mut cfg = SelfPatchConfig::default();
        assert!(cfg
            .apply_env(|k| (k == "SELFPATCH_BACKEND").then(|| "gemini".to_string()))
            .is_err());
    }

    #[test]
    fn test_unknown_toml_is_invalid_config() {
        let err = SelfPatchConfig::from_toml_str("invalid_patch_policy = 3").unwrap_err();
        assert!(matches!(err, SelfPatchError::InvalidConfig(_)));
    }

    #[test]
    fn test_sync_workdir_sets_mount_source() {
        let mut cfg = SelfPatchConfig::default();
        cfg.workdir = PathBuf::from("/srv/repo");
        cfg.sync_workdir();
        assert_eq!(cfg.sandbox.host_dir, PathBuf::from("/srv/repo"));
    }
}
