//! On-disk audit trail for improvement cycles.
//!
//! Layout under the audit directory:
//!
//! ```text
//! current_patch.diff                  empty baseline patch
//! new_patch.diff                      model-generated patch
//! invalid_patch.diff                  only when validation failed
//! temp.patch                          last patch handed to the applicator
//! output/<label>/<label>_report.json  one report per evaluation run
//! cycle.json + cycle.digest           cycle summary and its SHA-256
//! ```
//!
//! These files are written for operators; nothing reads them back as state
//! except [`AuditTrail::read_cycle_summary`], which verifies the digest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::apply::ApplyResult;
use crate::domain::error::{Result, SelfPatchError};
use crate::domain::report::{EvalReport, ResolvedDelta};
use crate::domain::task::is_path_component;
use crate::driver::DriverState;

pub const BASELINE_PATCH_FILE: &str = "current_patch.diff";
pub const NEW_PATCH_FILE: &str = "new_patch.diff";
pub const INVALID_PATCH_FILE: &str = "invalid_patch.diff";
pub const APPLIED_COPY_FILE: &str = "temp.patch";
pub const CYCLE_SUMMARY_FILE: &str = "cycle.json";
pub const CYCLE_DIGEST_FILE: &str = "cycle.digest";

/// Hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reject run labels that would place reports outside `output/`.
pub fn check_run_label(run_label: &str) -> Result<()> {
    if is_path_component(run_label) {
        Ok(())
    } else {
        Err(SelfPatchError::InvalidConfig(format!(
            "invalid run label: {run_label:?}"
        )))
    }
}

/// Persisted record of one finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub entry: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub transitions: Vec<DriverState>,
    pub problem_statement: String,
    pub patch_sha256: String,
    pub patch_well_formed: bool,
    pub apply: ApplyResult,
    pub baseline: EvalReport,
    pub post_patch: EvalReport,
    pub delta: ResolvedDelta,
}

/// Writes audit artifacts relative to one directory.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    dir: PathBuf,
}

impl AuditTrail {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn write(&self, file: &str, contents: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write the empty baseline patch.
    pub fn write_baseline_patch(&self) -> Result<PathBuf> {
        self.write(BASELINE_PATCH_FILE, b"")
    }

    pub fn write_new_patch(&self, text: &str) -> Result<PathBuf> {
        self.write(NEW_PATCH_FILE, text.as_bytes())
    }

    /// Dump a patch that failed structural validation, byte-identical.
    pub fn write_invalid_patch(&self, text: &str) -> Result<PathBuf> {
        self.write(INVALID_PATCH_FILE, text.as_bytes())
    }

    /// Host copy of the patch most recently handed to the applicator.
    pub fn write_applied_copy(&self, text: &str) -> Result<PathBuf> {
        self.write(APPLIED_COPY_FILE, text.as_bytes())
    }

    /// `output/<label>/<label>_report.json`
    pub fn report_path(&self, run_label: &str) -> PathBuf {
        self.dir
            .join("output")
            .join(run_label)
            .join(format!("{run_label}_report.json"))
    }

    pub fn write_report(&self, run_label: &str, report: &EvalReport) -> Result<PathBuf> {
        check_run_label(run_label)?;
        let path = self.report_path(run_label);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_vec_pretty(report)?)?;
        Ok(path)
    }

    /// Persist `cycle.json` and `cycle.digest`.
    pub fn write_cycle_summary(&self, summary: &CycleSummary) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(summary)?;
        let digest = sha256_hex(&json);
        let path = self.write(CYCLE_SUMMARY_FILE, &json)?;
        self.write(CYCLE_DIGEST_FILE, digest.as_bytes())?;
        Ok(path)
    }

    /// Read `cycle.json`, verifying it against `cycle.digest`.
    pub fn read_cycle_summary(&self) -> Result<CycleSummary> {
        let json = std::fs::read(self.path(CYCLE_SUMMARY_FILE))?;
        let expected = std::fs::read_to_string(self.path(CYCLE_DIGEST_FILE))?;
        let actual = sha256_hex(&json);
        if expected.trim() != actual {
            return Err(SelfPatchError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&json)?)
    }
}
