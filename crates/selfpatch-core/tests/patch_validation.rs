//! Structural validation of model-produced unified diffs.

use selfpatch_core::{validate, Patch, SelfPatchError};

const SIMPLE: &str = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1,1 +1,1 @@\n-foo\n+bar\n";

const MULTI_FILE: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,2 +1,2 @@
-pub fn a() {}
+pub fn a() -> u8 { 1 }
 pub fn b() {}
diff --git a/tests/a.rs b/tests/a.rs
--- a/tests/a.rs
+++ b/tests/a.rs
@@ -1 +1 @@
-// old
+// new
";

const NEW_FILE: &str = "\
diff --git a/docs/NOTES.md b/docs/NOTES.md
new file mode 100644
--- /dev/null
+++ b/docs/NOTES.md
@@ -0,0 +1,2 @@
+# Notes
+first line
";

const DELETIONS_ONLY: &str = "\
diff --git a/old.py b/old.py
--- a/old.py
+++ b/old.py
@@ -1,3 +1,1 @@
 keep = 1
-drop = 2
-also_drop = 3
";

#[test]
fn empty_input_is_not_well_formed() {
    assert!(!validate(""));
    assert!(!validate("   \n\t\n"));
}

#[test]
fn minimal_diff_is_well_formed() {
    assert!(validate(SIMPLE));
}

#[test]
fn multi_file_new_file_and_deletion_diffs_pass_same_checks() {
    assert!(validate(MULTI_FILE));
    assert!(validate(NEW_FILE));
    assert!(validate(DELETIONS_ONLY));
}

#[test]
fn each_missing_marker_fails_validation() {
    let no_header = SIMPLE.replace("diff --git a/x b/x\n", "");
    let no_hunk = SIMPLE.replace("@@ -1,1 +1,1 @@\n", "");
    let no_old_marker = SIMPLE.replace("--- a/x\n", "");
    let no_new_marker = SIMPLE.replace("+++ b/x\n", "");

    for text in [&no_header, &no_hunk, &no_old_marker, &no_new_marker] {
        assert!(!validate(text), "should reject:\n{text}");
    }
}

#[test]
fn markers_must_start_a_line() {
    let indented = "  diff --git a/x b/x\n  --- a/x\n  +++ b/x\n  @@ -1 +1 @@\n";
    assert!(!validate(indented));

    let prose = "Here is the fix: diff --git a/x b/x --- +++ @@";
    assert!(!validate(prose));
}

#[test]
fn markdown_fenced_diff_still_has_the_shape() {
    let fenced = format!("```diff\n{SIMPLE}```\n");
    assert!(validate(&fenced));
}

#[test]
fn validation_is_pure() {
    for text in ["", SIMPLE, MULTI_FILE, "garbage"] {
        assert_eq!(validate(text), validate(text));
    }
}

#[test]
fn patch_object_reports_touched_files_and_flags() {
    let patch = Patch::from_model_output(MULTI_FILE);
    assert!(patch.is_well_formed());
    assert_eq!(patch.touched_files(), vec!["src/lib.rs", "tests/a.rs"]);

    let flags = patch.flags();
    assert!(flags.has_header && flags.has_hunk && flags.has_file_markers);
}

#[test]
fn patch_check_names_missing_parts() {
    let patch = Patch::from_model_output("--- a/x\n+++ b/x\n");
    match patch.check() {
        Err(SelfPatchError::PatchMalformed { missing }) => {
            assert_eq!(missing.len(), 2);
        }
        other => panic!("expected PatchMalformed, got {:?}", other),
    }
    assert!(Patch::from_model_output(SIMPLE).check().is_ok());
}
