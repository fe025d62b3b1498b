//! Request templates for the diagnosis and patch-generation steps.

/// Ask the model to explain why `entry` fails, given evaluation `logs`.
pub fn diagnose_prompt(entry: &str, logs: &str) -> String {
    format!(
        "You are debugging a failing software task. Read the evaluation report \
and identify the smallest change that would make it pass.\n\
\n\
TASK: {entry}\n\
EVALUATION REPORT (JSON):\n{logs}\n\
\n\
Answer with these sections and nothing else:\n\
- ROOT CAUSE: one sentence.\n\
- EVIDENCE: two to five bullets citing failing tests or tracebacks from the report.\n\
- PLAN: ordered steps naming the files and locations to edit.\n\
- FILES: every path the change will touch.\n"
    )
}

/// Ask the model to turn a diagnosis into a unified diff.
pub fn improve_prompt(problem: &str) -> String {
    format!(
        "Implement the following fix as a unified diff.\n\
\n\
DIAGNOSIS:\n{problem}\n\
\n\
Rules:\n\
- Reply with the diff only: no prose, no markdown fences.\n\
- Begin every file with 'diff --git a/<path> b/<path>' followed by '---', '+++' and '@@' lines.\n\
- Paths are relative to the repository root with 'a/' and 'b/' prefixes.\n\
- New files use '--- /dev/null'.\n\
- Keep the change minimal; include tests in the same diff when they are needed.\n\
- The diff must apply with 'git apply' from the repository root without fuzz.\n"
    )
}
