use mend_core::types::{BugKind, BugReport};

#[test]
fn test_parse_valid_line() {
    let line = "[SYNTAX] error in src/app.py line 14 → Fix: close the string literal";
    let report = BugReport::parse(line).unwrap();
    assert_eq!(report.kind, BugKind::Syntax);
    assert_eq!(report.file, "src/app.py");
    assert_eq!(report.line, 14);
    assert_eq!(report.description, "close the string literal");
}

#[test]
fn test_parse_every_kind() {
    let cases = [
        ("LINTING", BugKind::Linting),
        ("SYNTAX", BugKind::Syntax),
        ("LOGIC", BugKind::Logic),
        ("TYPE_ERROR", BugKind::TypeError),
        ("IMPORT", BugKind::Import),
        ("INDENTATION", BugKind::Indentation),
    ];
    for (tag, kind) in cases {
        let line = format!("[{tag}] error in a.py line 1 → Fix: x");
        let report = BugReport::parse(&line).unwrap();
        assert_eq!(report.kind, kind);
    }
}

#[test]
fn test_reject_ascii_arrow() {
    assert!(BugReport::parse("[SYNTAX] error in a.py line 1 -> Fix: x").is_none());
}

#[test]
fn test_reject_unknown_kind() {
    assert!(BugReport::parse("[RUNTIME] error in a.py line 1 → Fix: x").is_none());
    assert!(BugReport::parse("[syntax] error in a.py line 1 → Fix: x").is_none());
}

#[test]
fn test_reject_malformed_location() {
    assert!(BugReport::parse("[SYNTAX] error in a.py line x → Fix: y").is_none());
    assert!(BugReport::parse("[SYNTAX] error in a.py → Fix: y").is_none());
    assert!(BugReport::parse("[SYNTAX] a.py line 1 → Fix: y").is_none());
}

#[test]
fn test_canonical_round_trip() {
    let report = BugReport {
        kind: BugKind::TypeError,
        file: "pkg/calc.ts".to_string(),
        line: 207,
        description: "coerce the result to number".to_string(),
    };
    let rendered = report.canonical();
    assert_eq!(BugReport::parse(&rendered).unwrap(), report);
}

#[test]
fn test_extract_all_skips_noise() {
    let output = "\
Here is my analysis of the failures.

[IMPORT] error in src/main.py line 2 → Fix: import os before use
some commentary in between
[LOGIC] error in src/calc.py line 31 → Fix: invert the comparison
[BOGUS] error in src/other.py line 9 → Fix: not a real kind
";
    let reports = BugReport::extract_all(output);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].kind, BugKind::Import);
    assert_eq!(reports[1].file, "src/calc.py");
}

#[test]
fn test_kind_serde_names() {
    assert_eq!(
        serde_json::to_string(&BugKind::TypeError).unwrap(),
        "\"TYPE_ERROR\""
    );
    assert_eq!(
        serde_json::from_str::<BugKind>("\"INDENTATION\"").unwrap(),
        BugKind::Indentation
    );
}
