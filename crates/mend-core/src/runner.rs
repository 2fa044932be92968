//! Stage 1: discover test files and execute them in the sandbox.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::discover::{classify, discover_test_files, run_plan};
use crate::error::HealError;
use crate::events::{EmitHandle, EventTag};
use crate::sandbox::{run_on_host, run_sandboxed, ContainerRuntime, ResourceLimits, SandboxMode};

/// Outcome of one sandboxed test run.
#[derive(Debug, Clone)]
pub struct TestRun {
    /// Workdir-relative paths, sorted.
    pub test_files: Vec<String>,
    pub passed: bool,
    pub logs: String,
    pub error: Option<HealError>,
}

pub struct TestRunner {
    mode: SandboxMode,
    runtime: Arc<dyn ContainerRuntime>,
    limits: ResourceLimits,
}

impl TestRunner {
    pub fn new(mode: SandboxMode, limits: ResourceLimits) -> Self {
        Self {
            mode,
            runtime: Arc::new(crate::sandbox::DockerCli),
            limits,
        }
    }

    /// Swap the container provider, used by callers that bring their own.
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub async fn run(&self, workdir: &Path, attempt: u32, emit: &EmitHandle) -> TestRun {
        emit.log(EventTag::Info, "Scanning repository for test files");
        let files = discover_test_files(workdir);
        if files.is_empty() {
            emit.log(EventTag::Error, "No test files found in the repository");
            return TestRun {
                test_files: Vec::new(),
                passed: false,
                logs: "No test files discovered in the repository.".to_string(),
                error: Some(HealError::DiscoveryEmpty),
            };
        }

        let test_files: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        emit.log(
            EventTag::Info,
            format!("Found {} test file(s)", test_files.len()),
        );

        let eco = classify(&files);
        let plan = run_plan(eco);
        info!(attempt, ecosystem = ?eco, image = plan.image, "executing test suite");

        let (logs, exit_code, error) = match self.mode {
            SandboxMode::Docker => {
                let name = container_name(attempt);
                emit.log(
                    EventTag::Info,
                    format!("Running tests in {} ({})", plan.image, name),
                );
                run_sandboxed(
                    self.runtime.as_ref(),
                    &name,
                    plan.image,
                    workdir,
                    &plan.container_command,
                    &self.limits,
                )
                .await
            }
            SandboxMode::Host => {
                emit.log(EventTag::Info, "Running tests on the host (no sandbox)");
                run_on_host(workdir, &plan.host_command).await
            }
        };

        let passed = exit_code == 0 && error.is_none();
        emit.log(
            if passed { EventTag::Pass } else { EventTag::Error },
            format!("Test run finished with exit code {exit_code}"),
        );

        TestRun {
            test_files,
            passed,
            logs,
            error,
        }
    }
}

fn container_name(attempt: u32) -> String {
    format!(
        "mend-sbx-{}-{}-{attempt}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    )
}
