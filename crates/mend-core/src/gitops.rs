//! Stage 3: guarded application of fixes to a healing branch.
//!
//! The two branch guards run before anything touches the repository and
//! reject the whole session, not just the attempt. Only the healing branch
//! is ever written to; whichever branch was checked out before is read for
//! logging and left alone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::branch::{branch_base, is_protected, HEALING_SUFFIX};
use crate::diff::unified_diff;
use crate::error::HealError;
use crate::events::{EmitHandle, EventTag};
use crate::types::MANIFEST_FILE;

pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Subprocess wrapper around the git CLI, rooted at one repository.
pub struct Git {
    pub repo_path: PathBuf,
}

impl Git {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    pub fn exec(&self, args: &[&str]) -> Result<ExecResult, HealError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo_path)
            .args(args)
            .output()
            .map_err(|e| {
                HealError::GitCommand(format!("failed to spawn git {}: {e}", args.join(" ")))
            })?;
        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(1),
        })
    }

    fn exec_ok(&self, args: &[&str]) -> Result<ExecResult, HealError> {
        let result = self.exec(args)?;
        if !result.success() {
            return Err(HealError::GitCommand(format!(
                "git {} failed: {}",
                args.join(" "),
                result.combined_output().trim()
            )));
        }
        Ok(result)
    }

    pub fn is_repo(&self) -> bool {
        self.exec(&["rev-parse", "--is-inside-work-tree"])
            .map(|r| r.success() && r.stdout.trim() == "true")
            .unwrap_or(false)
    }

    pub fn current_branch(&self) -> Result<String, HealError> {
        let result = self.exec_ok(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(result.stdout.trim().to_string())
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.exec(&["rev-parse", "--verify", &format!("refs/heads/{branch}")])
            .map(|r| r.success())
            .unwrap_or(false)
    }

    pub fn checkout(&self, branch: &str) -> Result<(), HealError> {
        self.exec_ok(&["checkout", branch]).map(|_| ())
    }

    pub fn checkout_new(&self, branch: &str) -> Result<(), HealError> {
        self.exec_ok(&["checkout", "-b", branch]).map(|_| ())
    }

    /// Stage exactly the given paths, never `add -A`.
    pub fn add_paths(&self, paths: &[String]) -> Result<(), HealError> {
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.exec_ok(&args).map(|_| ())
    }

    pub fn commit(&self, message: &str, author: Option<(&str, &str)>) -> Result<String, HealError> {
        let mut args = vec!["commit", "-m", message];
        let author_str;
        if let Some((name, email)) = author {
            author_str = format!("{name} <{email}>");
            args.push("--author");
            args.push(&author_str);
        }
        self.exec_ok(&args)?;
        let head = self.exec_ok(&["rev-parse", "HEAD"])?;
        Ok(head.stdout.trim().to_string())
    }

    pub fn has_staged_changes(&self) -> Result<bool, HealError> {
        let result = self.exec(&["diff", "--cached", "--quiet"])?;
        Ok(!result.success())
    }

    /// Push the branch to its own name only, setting upstream.
    pub fn push_upstream(&self, branch: &str) -> Result<ExecResult, HealError> {
        self.exec(&["push", "-u", "origin", &format!("{branch}:{branch}")])
    }
}

/// What the mutation stage produced for one attempt.
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    pub branch_pushed: Option<String>,
    pub commit_sha: Option<String>,
    pub diffs: BTreeMap<String, String>,
    pub error: Option<HealError>,
}

/// Apply the fix map onto the healing branch, commit and push.
///
/// Guard A: the branch must carry the healing suffix. Guard B: its base
/// must not be a protected branch. Both reject the session. An empty fix
/// map is a no-op after the guards. A push failure keeps the local commit
/// and is surfaced as [`HealError::PushFailed`].
pub fn apply_fixes(
    workdir: &Path,
    branch: &str,
    fixes: &BTreeMap<String, String>,
    bug_reports: &[String],
    author: Option<(&str, &str)>,
    emit: &EmitHandle,
) -> MutationOutcome {
    if !branch.ends_with(HEALING_SUFFIX) {
        let err = HealError::GuardRejection {
            branch: branch.to_string(),
            reason: format!("missing required suffix {HEALING_SUFFIX}"),
        };
        emit.log(EventTag::Error, err.to_string());
        return MutationOutcome {
            error: Some(err),
            ..MutationOutcome::default()
        };
    }
    if is_protected(branch) {
        let err = HealError::GuardRejection {
            branch: branch.to_string(),
            reason: format!("base {:?} is a protected branch", branch_base(branch)),
        };
        emit.log(EventTag::Error, err.to_string());
        return MutationOutcome {
            error: Some(err),
            ..MutationOutcome::default()
        };
    }

    if fixes.is_empty() {
        emit.log(EventTag::Info, "No fixes to apply this attempt");
        return MutationOutcome::default();
    }

    match apply_inner(workdir, branch, fixes, bug_reports, author, emit) {
        Ok(outcome) => outcome,
        Err(e) => {
            emit.log(EventTag::Error, e.to_string());
            MutationOutcome {
                error: Some(e),
                ..MutationOutcome::default()
            }
        }
    }
}

fn apply_inner(
    workdir: &Path,
    branch: &str,
    fixes: &BTreeMap<String, String>,
    bug_reports: &[String],
    author: Option<(&str, &str)>,
    emit: &EmitHandle,
) -> Result<MutationOutcome, HealError> {
    let git = Git::new(workdir);
    if !git.is_repo() {
        return Err(HealError::GitCommand(format!(
            "{} is not a git repository",
            workdir.display()
        )));
    }

    let previous = git.current_branch()?;
    info!(previous = %previous, healing = %branch, "switching to healing branch");
    if git.branch_exists(branch) {
        git.checkout(branch)?;
    } else {
        git.checkout_new(branch)?;
    }

    let mut diffs = BTreeMap::new();
    let mut touched = Vec::with_capacity(fixes.len());
    for (rel, content) in fixes {
        let target = workdir.join(rel);
        let old = std::fs::read_to_string(&target).unwrap_or_default();
        diffs.insert(rel.clone(), unified_diff(&old, content, rel));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, content)?;
        emit.log(EventTag::Patch, format!("Patched {rel}"));
        touched.push(rel.clone());
    }

    git.add_paths(&touched)?;

    let summary = if bug_reports.is_empty() {
        "autonomous healing pass".to_string()
    } else {
        bug_reports
            .iter()
            .take(5)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    };
    let message = format!("[AI-AGENT] {summary}");
    let sha = git.commit(&message, author)?;
    info!(sha = %sha, files = touched.len(), "committed fixes");

    let push = git.push_upstream(branch)?;
    if !push.success() {
        // The commit stays; only the remote is behind.
        let err = HealError::PushFailed {
            branch: branch.to_string(),
            detail: push.combined_output().trim().to_string(),
        };
        warn!("{err}");
        emit.log(EventTag::Error, err.to_string());
        return Ok(MutationOutcome {
            branch_pushed: None,
            commit_sha: Some(sha),
            diffs,
            error: Some(err),
        });
    }

    emit.log(EventTag::Pass, format!("Pushed {branch}"));
    Ok(MutationOutcome {
        branch_pushed: Some(branch.to_string()),
        commit_sha: Some(sha),
        diffs,
        error: None,
    })
}

/// Best-effort commit and push of the session manifest onto the healing
/// branch. Skipped silently when the branch was never created. The branch
/// guards are re-checked here; this path pushes too.
pub fn commit_manifest(
    workdir: &Path,
    branch: &str,
    author: Option<(&str, &str)>,
) -> Result<(), HealError> {
    if !branch.ends_with(HEALING_SUFFIX) {
        return Err(HealError::GuardRejection {
            branch: branch.to_string(),
            reason: format!("missing required suffix {HEALING_SUFFIX}"),
        });
    }
    if is_protected(branch) {
        return Err(HealError::GuardRejection {
            branch: branch.to_string(),
            reason: format!("base {:?} is a protected branch", branch_base(branch)),
        });
    }

    let git = Git::new(workdir);
    if !git.is_repo() || !git.branch_exists(branch) {
        return Ok(());
    }
    git.checkout(branch)?;
    git.add_paths(&[MANIFEST_FILE.to_string()])?;
    if !git.has_staged_changes()? {
        return Ok(());
    }
    git.commit("[AI-AGENT] Add results.json session report", author)?;
    let push = git.push_upstream(branch)?;
    if !push.success() {
        warn!(
            "manifest push failed: {}",
            push.combined_output().trim()
        );
    }
    Ok(())
}
