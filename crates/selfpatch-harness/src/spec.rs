//! Harness invocation: the rendered command for one evaluation run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use selfpatch_core::EvalRequest;

use crate::error::HarnessError;

/// Placeholders accepted in a harness command template.
pub const PLACEHOLDERS: [&str; 7] = [
    "patch_path",
    "run_label",
    "subset",
    "num_instances",
    "max_workers",
    "instances_file",
    "report_path",
];

/// A fully rendered harness invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HarnessSpec {
    pub argv: Vec<String>,
    /// JSON array of the selected task ids, handed to the harness.
    pub instances_file: PathBuf,
    /// Where the harness must write its JSON report.
    pub report_path: PathBuf,
    /// SHA-256 of the NUL-joined argv, for log correlation.
    pub command_digest: String,
}

impl HarnessSpec {
    /// Substitute `request` and the file locations into `template`.
    pub fn render(
        template: &[String],
        request: &EvalRequest,
        instances_file: PathBuf,
        report_path: PathBuf,
    ) -> Result<Self, HarnessError> {
        if template.is_empty() {
            return Err(HarnessError::Template("empty command".to_string()));
        }

        let values = [
            request.patch_path.display().to_string(),
            request.run_label.clone(),
            request.subset.clone(),
            request.num_instances.to_string(),
            request.max_workers.to_string(),
            instances_file.display().to_string(),
            report_path.display().to_string(),
        ];

        let argv = template
            .iter()
            .map(|arg| substitute(arg, &values))
            .collect::<Result<Vec<_>, _>>()?;
        let command_digest = compute_command_digest(&argv);

        Ok(Self {
            argv,
            instances_file,
            report_path,
            command_digest,
        })
    }
}

fn substitute(arg: &str, values: &[String; 7]) -> Result<String, HarnessError> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            HarnessError::Template(format!("unterminated placeholder in {arg:?}"))
        })?;
        let name = &after[..close];
        let index = PLACEHOLDERS
            .iter()
            .position(|p| *p == name)
            .ok_or_else(|| HarnessError::Template(format!("unknown placeholder {{{name}}}")))?;
        out.push_str(&values[index]);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Compute deterministic digest of an argv.
fn compute_command_digest(argv: &[String]) -> String {
    let mut hasher = Sha256::new();
    for arg in argv {
        hasher.update(arg.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EvalRequest {
        EvalRequest {
            patch_path: PathBuf::from("new_patch.diff"),
            run_label: "improved".to_string(),
            subset: "small".to_string(),
            num_instances: 3,
            max_workers: 5,
        }
    }

    fn template(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_substitutes_every_placeholder() {
        let spec = HarnessSpec::render(
            &template(&[
                "harness",
                "--patch={patch_path}",
                "{run_label}",
                "{subset}:{num_instances}",
                "-j{max_workers}",
                "{instances_file}",
                "{report_path}",
            ]),
            &request(),
            PathBuf::from("/tmp/ids.json"),
            PathBuf::from("/tmp/report.json"),
        )
        .unwrap();

        assert_eq!(
            spec.argv,
            vec![
                "harness",
                "--patch=new_patch.diff",
                "improved",
                "small:3",
                "-j5",
                "/tmp/ids.json",
                "/tmp/report.json",
            ]
        );
        assert_eq!(spec.command_digest.len(), 64);
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let err = HarnessSpec::render(
            &template(&["harness", "{model}"]),
            &request(),
            PathBuf::from("i"),
            PathBuf::from("r"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("{model}"));
    }

    #[test]
    fn test_unterminated_placeholder_rejected() {
        assert!(HarnessSpec::render(
            &template(&["harness", "{subset"]),
            &request(),
            PathBuf::from("i"),
            PathBuf::from("r"),
        )
        .is_err());
    }

    #[test]
    fn test_digest_deterministic() {
        let a = compute_command_digest(&template(&["a", "b"]));
        let b = compute_command_digest(&template(&["a", "b"]));
        let c = compute_command_digest(&template(&["ab"]));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
