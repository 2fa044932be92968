//! The healing loop: test, synthesize, mutate, repeat until green or the
//! attempt budget runs out.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::branch::format_branch_name;
use crate::config::Config;
use crate::error::HealError;
use crate::events::{EmitHandle, EventTag, HealEvent};
use crate::gitops;
use crate::model::FixModel;
use crate::runner::TestRunner;
use crate::sandbox::{ContainerRuntime, DockerCli, ResourceLimits, SandboxMode};
use crate::synthesize::{Synthesis, Synthesizer};
use crate::types::{
    format_elapsed, AttemptResult, BugReport, FixRecord, Manifest, SessionStatus, TimelineEntry,
    MANIFEST_FILE,
};

pub struct Orchestrator {
    pub config: Config,
    pub model: Arc<dyn FixModel>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl Orchestrator {
    pub fn new(config: Config, model: Arc<dyn FixModel>) -> Self {
        Self {
            config,
            model,
            runtime: Arc::new(DockerCli),
        }
    }

    /// Swap the container provider, used by callers that bring their own.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Run one healing session over `workdir`. The branch name is derived
    /// from `label`; progress flows over `events` when given. The manifest
    /// is written to the workdir root no matter how the session ends.
    pub async fn heal(
        &self,
        workdir: &Path,
        label: &str,
        events: Option<UnboundedSender<HealEvent>>,
    ) -> Manifest {
        let emit = events.map_or_else(EmitHandle::disabled, EmitHandle::new);
        let started = Instant::now();
        let run_timestamp = Utc::now();

        let branch = format_branch_name(label);
        info!(branch = %branch, workdir = %workdir.display(), "healing session starting");
        emit.log(
            EventTag::Info,
            format!("Healing session starting on branch {branch}"),
        );

        let mode = SandboxMode::detect(&self.config.sandbox_backend).await;
        let runner = TestRunner::new(
            mode,
            ResourceLimits {
                memory_mb: self.config.sandbox_memory_mb,
                cpu_quota: self.config.sandbox_cpu_quota,
                ..ResourceLimits::default()
            },
        )
        .with_runtime(self.runtime.clone());
        let synthesizer = Synthesizer::new(self.model.clone());

        let mut timeline: Vec<TimelineEntry> = Vec::new();
        let mut fix_records: Vec<FixRecord> = Vec::new();
        let mut seen_bugs: HashSet<String> = HashSet::new();
        let mut all_diffs: BTreeMap<String, String> = BTreeMap::new();
        let mut total_failures = 0usize;
        let mut total_fixes = 0usize;
        let mut pushed_any = false;
        let mut any_fixes_applied = false;
        let mut first_error: Option<HealError> = None;
        let mut fatal_error: Option<HealError> = None;
        let mut passed = false;
        let mut iterations_used = 0usize;

        let max = self.config.max_attempts.max(1);
        for attempt in 1..=max {
            iterations_used = attempt as usize;
            emit.log(EventTag::Info, format!("Attempt {attempt}/{max}"));

            let run = runner.run(workdir, attempt, &emit).await;
            passed = run.passed;

            // A poisoned run has nothing worth sending to the model.
            let synthesis = if run.passed || run.error.is_some() {
                Synthesis::default()
            } else {
                synthesizer.synthesize(workdir, &run.logs, &emit).await
            };

            let mutation = if run.error.is_some() {
                gitops::MutationOutcome::default()
            } else {
                gitops::apply_fixes(
                    workdir,
                    &branch,
                    &synthesis.fixes,
                    &synthesis.bug_reports,
                    self.config.git_author(),
                    &emit,
                )
            };

            // The one record an attempt leaves behind.
            let result = AttemptResult {
                test_files: run.test_files,
                passed: run.passed,
                logs: run.logs,
                bug_reports: synthesis.bug_reports,
                fixes: synthesis.fixes,
                branch_pushed: mutation.branch_pushed,
                commit_sha: mutation.commit_sha,
                diffs: mutation.diffs,
                error: run
                    .error
                    .or(synthesis.error)
                    .or(mutation.error),
            };

            if result.branch_pushed.is_some() {
                pushed_any = true;
            }
            if result.commit_sha.is_some() {
                any_fixes_applied = true;
            }
            all_diffs.extend(result.diffs.clone());

            let failures_in_run = result.bug_reports.len();
            let fixes_in_run = result.fixes.len();
            total_failures = total_failures.max(failures_in_run);
            total_fixes += fixes_in_run;

            timeline.push(TimelineEntry {
                status: if result.passed { "PASSED" } else { "FAILED" }.to_string(),
                timestamp: Utc::now().format("%H:%M:%S").to_string(),
                message: if result.passed {
                    "All tests passed".to_string()
                } else {
                    format!("{failures_in_run} issue(s) reported, {fixes_in_run} fix(es) applied")
                },
                failures_in_run,
                fixes_in_run,
            });

            for line in &result.bug_reports {
                if !seen_bugs.insert(line.clone()) {
                    continue;
                }
                let Some(report) = BugReport::parse(line) else {
                    continue;
                };
                let status = if result.fixes.contains_key(&report.file) {
                    "fixed"
                } else {
                    "failed"
                };
                fix_records.push(FixRecord {
                    file: report.file,
                    bug_type: report.kind,
                    line_number: report.line,
                    commit_message: format!("[AI-AGENT] Fix: {}", report.description),
                    status: status.to_string(),
                    fix_description: report.description,
                });
            }

            if let Some(err) = &result.error {
                warn!(attempt, "attempt ended with error: {err}");
                if first_error.is_none() {
                    first_error = Some(err.clone());
                }
                if fatal_error.is_none() && !err.is_partial() {
                    fatal_error = Some(err.clone());
                }
                if err.is_session_fatal() {
                    emit.log(EventTag::Error, "Session aborted by branch guard");
                    break;
                }
            }

            if result.passed {
                emit.log(EventTag::Pass, "Test suite is green, converged");
                break;
            }
            if result.bug_reports.is_empty() {
                // Failing run the model has nothing to say about; retrying
                // with identical input would stall forever.
                emit.log(EventTag::Info, "No bug reports produced, stopping early");
                break;
            }
        }

        // A recorded fatal error outranks everything, even a green last run.
        let status = if fatal_error.is_some() {
            SessionStatus::Failed
        } else if passed && pushed_any {
            SessionStatus::Success
        } else if passed && !any_fixes_applied {
            SessionStatus::NoFixes
        } else {
            SessionStatus::Partial
        };

        let manifest = Manifest {
            run_timestamp,
            branch_name: branch.clone(),
            iterations_used,
            max_iterations: max,
            total_failures,
            total_fixes,
            status,
            execution_time: format_elapsed(started.elapsed()),
            timeline,
            fixes: fix_records,
            diffs: all_diffs,
            error: first_error.map(|e| e.to_string()),
        };

        self.write_manifest(workdir, &manifest);
        if let Err(e) = gitops::commit_manifest(workdir, &branch, self.config.git_author()) {
            warn!("manifest commit skipped: {e}");
        }

        info!(
            status = %status,
            iterations = manifest.iterations_used,
            elapsed = %manifest.execution_time,
            "healing session finished"
        );
        emit.log(
            EventTag::Info,
            format!(
                "Session finished: {status} after {} attempt(s) in {}",
                manifest.iterations_used, manifest.execution_time
            ),
        );
        emit.done(status);
        manifest
    }

    fn write_manifest(&self, workdir: &Path, manifest: &Manifest) {
        match serde_json::to_string_pretty(manifest) {
            Ok(json) => {
                if let Err(e) = std::fs::write(workdir.join(MANIFEST_FILE), json) {
                    warn!("failed to write {MANIFEST_FILE}: {e}");
                }
            }
            Err(e) => warn!("failed to serialize {MANIFEST_FILE}: {e}"),
        }
    }
}
