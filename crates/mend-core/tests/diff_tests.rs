use mend_core::diff::{unified_diff, MAX_DIFF_LINES};

#[test]
fn test_identical_content_yields_empty_diff() {
    assert_eq!(unified_diff("a\nb\n", "a\nb\n", "x.py"), "");
    assert_eq!(unified_diff("", "", "x.py"), "");
}

#[test]
fn test_single_line_change() {
    let diff = unified_diff("a\nb\nc\n", "a\nx\nc\n", "src/app.py");
    let lines: Vec<&str> = diff.lines().collect();
    assert_eq!(lines[0], "--- a/src/app.py");
    assert_eq!(lines[1], "+++ b/src/app.py");
    assert_eq!(lines[2], "@@ -1,3 +1,3 @@");
    assert_eq!(&lines[3..], &[" a", "-b", "+x", " c"]);
}

#[test]
fn test_new_file_diff() {
    let diff = unified_diff("", "hello\nworld\n", "fresh.py");
    let lines: Vec<&str> = diff.lines().collect();
    assert_eq!(lines[2], "@@ -0,0 +1,2 @@");
    assert_eq!(&lines[3..], &["+hello", "+world"]);
}

#[test]
fn test_deletion_only() {
    let diff = unified_diff("keep\ngone\n", "keep\n", "f.py");
    assert!(diff.contains("-gone"));
    assert!(!diff.contains("+gone"));
}

#[test]
fn test_distant_changes_get_separate_hunks() {
    let mut old: Vec<String> = (0..60).map(|i| format!("line{i}")).collect();
    let mut new = old.clone();
    new[2] = "changed-early".to_string();
    new[50] = "changed-late".to_string();
    old.push(String::new());
    new.push(String::new());

    let diff = unified_diff(&old.join("\n"), &new.join("\n"), "big.py");
    let hunks = diff.lines().filter(|l| l.starts_with("@@")).count();
    assert_eq!(hunks, 2);
    assert!(diff.contains("+changed-early"));
    assert!(diff.contains("+changed-late"));
}

#[test]
fn test_output_is_capped() {
    let old: String = (0..300).map(|i| format!("old{i}\n")).collect();
    let new: String = (0..300).map(|i| format!("new{i}\n")).collect();
    let diff = unified_diff(&old, &new, "huge.py");
    assert_eq!(diff.lines().count(), MAX_DIFF_LINES);
}
