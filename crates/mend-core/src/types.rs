use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HealError;

// ── Bug-report grammar ──

/// The arrow separating location from fix description in a bug line (U+2192).
pub const ARROW: char = '→';

/// Closed set of defect categories the model is allowed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BugKind {
    Linting,
    Syntax,
    Logic,
    TypeError,
    Import,
    Indentation,
}

impl BugKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linting => "LINTING",
            Self::Syntax => "SYNTAX",
            Self::Logic => "LOGIC",
            Self::TypeError => "TYPE_ERROR",
            Self::Import => "IMPORT",
            Self::Indentation => "INDENTATION",
        }
    }
}

impl fmt::Display for BugKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BugKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LINTING" => Ok(Self::Linting),
            "SYNTAX" => Ok(Self::Syntax),
            "LOGIC" => Ok(Self::Logic),
            "TYPE_ERROR" => Ok(Self::TypeError),
            "IMPORT" => Ok(Self::Import),
            "INDENTATION" => Ok(Self::Indentation),
            _ => Err(()),
        }
    }
}

#[allow(clippy::unwrap_used)]
static BUG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[(LINTING|SYNTAX|LOGIC|TYPE_ERROR|IMPORT|INDENTATION)\] error in (.+?) line (\d+) → Fix: (.+)",
    )
    .unwrap()
});

/// One parsed line of the model's bug-report section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugReport {
    pub kind: BugKind,
    pub file: String,
    pub line: u32,
    pub description: String,
}

impl BugReport {
    /// Parse a single line against the grammar. Lines using an ASCII arrow,
    /// an unknown kind, or a non-numeric line number do not match.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = BUG_LINE.captures(line)?;
        Some(Self {
            kind: BugKind::from_str(&caps[1]).ok()?,
            file: caps[2].to_string(),
            line: caps[3].parse().ok()?,
            description: caps[4].trim().to_string(),
        })
    }

    /// Scan arbitrary model output, keeping only lines that match the grammar.
    pub fn extract_all(text: &str) -> Vec<Self> {
        text.lines().filter_map(Self::parse).collect()
    }

    /// Re-render in the exact grammar. `parse(canonical(x)) == x`.
    pub fn canonical(&self) -> String {
        format!(
            "[{}] error in {} line {} {} Fix: {}",
            self.kind, self.file, self.line, ARROW, self.description
        )
    }
}

// ── Session records ──

/// Terminal classification of a healing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Tests passing and at least one fix was pushed.
    Success,
    /// Tests passed without any fix ever being applied.
    NoFixes,
    /// Retry budget exhausted or the model went quiet, but nothing fatal.
    Partial,
    /// A fatal error ended the session.
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::NoFixes => "NO_FIXES",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the per-attempt timeline kept in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// "PASSED" or "FAILED".
    pub status: String,
    /// Wall-clock `HH:MM:SS`.
    pub timestamp: String,
    pub message: String,
    pub failures_in_run: usize,
    pub fixes_in_run: usize,
}

/// A deduplicated bug line promoted to a reportable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixRecord {
    pub file: String,
    pub bug_type: BugKind,
    pub line_number: u32,
    pub commit_message: String,
    /// "fixed" when the fix map contained the file, "failed" otherwise.
    pub status: String,
    pub fix_description: String,
}

/// What one trip through the three stages produced. The only carrier of
/// state between stages and into the orchestrator's bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AttemptResult {
    /// Workdir-relative paths of the discovered test files.
    pub test_files: Vec<String>,
    pub passed: bool,
    pub logs: String,
    /// Canonical bug lines, in model order.
    pub bug_reports: Vec<String>,
    /// Relative path to complete replacement content.
    pub fixes: BTreeMap<String, String>,
    pub branch_pushed: Option<String>,
    pub commit_sha: Option<String>,
    /// Relative path to unified diff of what was written.
    pub diffs: BTreeMap<String, String>,
    /// First error hit in any stage of this attempt.
    pub error: Option<HealError>,
}

/// The session report written to `results.json` at the workdir root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_timestamp: DateTime<Utc>,
    pub branch_name: String,
    pub iterations_used: usize,
    pub max_iterations: u32,
    pub total_failures: usize,
    pub total_fixes: usize,
    pub status: SessionStatus,
    pub execution_time: String,
    pub timeline: Vec<TimelineEntry>,
    pub fixes: Vec<FixRecord>,
    pub diffs: BTreeMap<String, String>,
    pub error: Option<String>,
}

/// Name of the manifest file, overwritten at the end of every session.
pub const MANIFEST_FILE: &str = "results.json";

/// Render a duration the way the session summary reports it, e.g. `3m27s`.
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m{}s", secs / 60, secs % 60)
}
