//! Isolated execution of repository test suites.
//!
//! Two providers: a Docker CLI lifecycle (run detached, wait with a hard
//! timeout, capture logs, force-remove) and a host-subprocess fallback for
//! machines without a daemon. The provider is chosen once per session.
//! The docker lifecycle sits behind [`ContainerRuntime`] so tests can
//! substitute a mock and assert teardown happens exactly once on every
//! exit path.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::HealError;

/// Hard wall-clock ceiling for one containerized test run.
pub const SANDBOX_TIMEOUT_S: u64 = 180;
/// Shorter ceiling for the host-subprocess fallback.
pub const HOST_TIMEOUT_S: u64 = 120;

#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub memory_mb: u64,
    /// Microseconds of CPU per scheduling period.
    pub cpu_quota: i64,
    pub cpu_period: i64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 512,
            cpu_quota: 50_000,
            cpu_period: 100_000,
        }
    }
}

/// Which execution provider a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    Docker,
    /// Plain subprocess on the host, no resource ceilings.
    Host,
}

impl SandboxMode {
    pub fn from_str_or_auto(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Some(Self::Docker),
            "none" | "host" | "direct" => Some(Self::Host),
            _ => None, // "auto" or unrecognised, detect at runtime
        }
    }

    /// Pick the provider for a session given a preference string.
    pub async fn detect(preferred: &str) -> Self {
        if let Some(forced) = Self::from_str_or_auto(preferred) {
            return forced;
        }
        if docker_available().await {
            info!("sandbox: docker daemon detected");
            Self::Docker
        } else {
            warn!("sandbox: docker unavailable, falling back to host subprocess");
            Self::Host
        }
    }
}

pub async fn docker_available() -> bool {
    Command::new("docker")
        .arg("version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Container lifecycle primitives for one test run.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container with the repo bind-mounted rw at /repo.
    async fn start(
        &self,
        name: &str,
        image: &str,
        workdir: &Path,
        command: &str,
        limits: &ResourceLimits,
    ) -> Result<(), HealError>;

    /// Block until the container exits; the returned value is its exit code.
    async fn wait(&self, name: &str, timeout: Duration) -> Result<i64, HealError>;

    async fn logs(&self, name: &str) -> Result<String, HealError>;

    /// Force-remove. Must be safe to call on an already-dead container.
    async fn remove(&self, name: &str) -> Result<(), HealError>;
}

/// Production provider shelling out to the docker CLI.
pub struct DockerCli;

async fn docker_output(args: &[String]) -> Result<(String, String, i64), HealError> {
    let output = Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| HealError::SandboxUnavailable(format!("failed to spawn docker: {e}")))?;
    Ok((
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
        i64::from(output.status.code().unwrap_or(1)),
    ))
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start(
        &self,
        name: &str,
        image: &str,
        workdir: &Path,
        command: &str,
        limits: &ResourceLimits,
    ) -> Result<(), HealError> {
        let mut args: Vec<String> = vec!["run".into(), "-d".into(), "--name".into(), name.into()];
        args.push("--memory".into());
        args.push(format!("{}m", limits.memory_mb));
        args.push("--cpu-period".into());
        args.push(limits.cpu_period.to_string());
        args.push("--cpu-quota".into());
        args.push(limits.cpu_quota.to_string());
        args.push("-v".into());
        args.push(format!("{}:/repo:rw", workdir.display()));
        args.push("-w".into());
        args.push("/repo".into());
        args.push(image.into());
        args.extend(["sh".into(), "-c".into(), command.into()]);

        let (_, stderr, code) = docker_output(&args).await?;
        if code != 0 {
            return Err(HealError::SandboxUnavailable(format!(
                "docker run failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn wait(&self, name: &str, timeout: Duration) -> Result<i64, HealError> {
        let args = vec!["wait".to_string(), name.to_string()];
        let waited = tokio::time::timeout(timeout, docker_output(&args))
            .await
            .map_err(|_| HealError::SandboxTimeout(timeout.as_secs()))?;
        let (stdout, stderr, code) = waited?;
        if code != 0 {
            return Err(HealError::SandboxUnavailable(format!(
                "docker wait failed: {}",
                stderr.trim()
            )));
        }
        stdout
            .trim()
            .parse()
            .map_err(|_| HealError::SandboxUnavailable(format!("docker wait output: {stdout:?}")))
    }

    async fn logs(&self, name: &str) -> Result<String, HealError> {
        let args = vec!["logs".to_string(), name.to_string()];
        let (stdout, stderr, _) = docker_output(&args).await?;
        if stderr.is_empty() {
            Ok(stdout)
        } else {
            Ok(format!("{stdout}\n{stderr}"))
        }
    }

    async fn remove(&self, name: &str) -> Result<(), HealError> {
        let args = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
        let (_, stderr, code) = docker_output(&args).await?;
        if code != 0 {
            return Err(HealError::SandboxUnavailable(format!(
                "docker rm -f failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Drive one container through its full lifecycle.
///
/// Once `start` succeeds, `remove` is called exactly once no matter how
/// wait or log capture end. Returns combined logs, exit code, and the
/// error if any.
pub async fn run_sandboxed(
    runtime: &dyn ContainerRuntime,
    name: &str,
    image: &str,
    workdir: &Path,
    command: &str,
    limits: &ResourceLimits,
) -> (String, i64, Option<HealError>) {
    if let Err(e) = runtime.start(name, image, workdir, command, limits).await {
        return (format!("sandbox start failed: {e}"), 1, Some(e));
    }

    let outcome = match runtime
        .wait(name, Duration::from_secs(SANDBOX_TIMEOUT_S))
        .await
    {
        Ok(exit_code) => {
            let logs = runtime
                .logs(name)
                .await
                .unwrap_or_else(|e| format!("log capture failed: {e}"));
            (logs, exit_code, None)
        }
        Err(e) => (e.to_string(), 1, Some(e)),
    };

    if let Err(e) = runtime.remove(name).await {
        warn!(container = name, "sandbox cleanup failed: {e}");
    }
    outcome
}

/// Host-subprocess fallback: same install-then-test shell line, run in the
/// repo directory under a shorter wall clock.
pub async fn run_on_host(workdir: &Path, command: &str) -> (String, i64, Option<HealError>) {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(workdir)
        .kill_on_drop(true);

    let fut = cmd.output();
    let output = match tokio::time::timeout(Duration::from_secs(HOST_TIMEOUT_S), fut).await {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            let err = HealError::SandboxUnavailable(format!("failed to spawn test shell: {e}"));
            return (err.to_string(), 1, Some(err));
        }
        Err(_) => {
            let err = HealError::SandboxTimeout(HOST_TIMEOUT_S);
            return (err.to_string(), 1, Some(err));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let logs = if stderr.is_empty() {
        stdout.into_owned()
    } else {
        format!("{stdout}\n{stderr}")
    };
    (logs, i64::from(output.status.code().unwrap_or(1)), None)
}
