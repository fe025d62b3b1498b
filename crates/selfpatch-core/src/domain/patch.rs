//! Unified-diff patch object and structural validator.
//!
//! Validation is syntactic only: a well-formed patch has the *shape* of a
//! unified diff (header, hunk, old/new file markers). Whether it applies is
//! decided later by the sandbox's apply command.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{Result, SelfPatchError};

/// Line prefix of a git diff header.
pub const DIFF_HEADER: &str = "diff --git";
/// Line prefix of a hunk header.
pub const HUNK_MARKER: &str = "@@";
/// Line prefix of the old-file marker.
pub const OLD_FILE_MARKER: &str = "---";
/// Line prefix of the new-file marker.
pub const NEW_FILE_MARKER: &str = "+++";

/// Structural flags derived from a patch's text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchFlags {
    pub has_header: bool,
    pub has_hunk: bool,
    /// Both an old-file and a new-file marker line are present.
    pub has_file_markers: bool,
}

impl PatchFlags {
    /// Scan `text` line by line. Never fails.
    pub fn scan(text: &str) -> Self {
        let mut has_header = false;
        let mut has_hunk = false;
        let mut has_old = false;
        let mut has_new = false;

        for line in text.split('\n') {
            has_header |= line.starts_with(DIFF_HEADER);
            has_hunk |= line.starts_with(HUNK_MARKER);
            has_old |= line.starts_with(OLD_FILE_MARKER);
            has_new |= line.starts_with(NEW_FILE_MARKER);
        }

        Self {
            has_header,
            has_hunk,
            has_file_markers: has_old && has_new,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.has_header && self.has_hunk && self.has_file_markers
    }

    /// Human-readable names of the missing structural elements.
    pub fn missing(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.has_header {
            out.push("diff header".to_string());
        }
        if !self.has_hunk {
            out.push("hunk marker".to_string());
        }
        if !self.has_file_markers {
            out.push("file markers".to_string());
        }
        out
    }
}

/// Returns `true` iff `raw` has the shape of a unified diff.
///
/// Empty or whitespace-only input is never well-formed. Multi-file patches,
/// `/dev/null` new-file patches and deletion-only patches go through the same
/// three checks.
pub fn validate(raw: &str) -> bool {
    if raw.trim().is_empty() {
        return false;
    }
    PatchFlags::scan(raw).is_well_formed()
}

/// A unified diff produced by the language model, plus derived flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    text: String,
    flags: PatchFlags,
}

impl Patch {
    /// Wrap raw model output verbatim. No parsing or cleanup is applied.
    pub fn from_model_output(raw: impl Into<String>) -> Self {
        let text = raw.into();
        let flags = PatchFlags::scan(&text);
        Self { text, flags }
    }

    /// The empty (no-op) patch used for baseline evaluation.
    pub fn empty() -> Self {
        Self::from_model_output(String::new())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn flags(&self) -> PatchFlags {
        self.flags
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn is_well_formed(&self) -> bool {
        validate(&self.text)
    }

    /// Structural check as a `Result`, for callers that fail fast.
    pub fn check(&self) -> Result<()> {
        if self.is_well_formed() {
            return Ok(());
        }
        let missing = if self.is_empty() {
            vec!["content".to_string()]
        } else {
            self.flags.missing()
        };
        Err(SelfPatchError::PatchMalformed { missing })
    }

    /// Repository-relative paths named in `diff --git a/<path> b/<path>` headers.
    pub fn touched_files(&self) -> Vec<String> {
        static HEADER: OnceLock<Regex> = OnceLock::new();
        let re = HEADER.get_or_init(|| {
            Regex::new(r"(?m)^diff --git a/(\S+) b/(\S+)\s*$").expect("static regex is valid")
        });

        let mut files: Vec<String> = Vec::new();
        for caps in re.captures_iter(&self.text) {
            let path = caps[2].to_string();
            if !files.contains(&path) {
                files.push(path);
            }
        }
        files
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
