use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mend_core::error::HealError;
use mend_core::sandbox::{
    run_sandboxed, ContainerRuntime, ResourceLimits, SandboxMode,
};

#[derive(Clone, Copy)]
enum WaitScript {
    Exit(i64),
    Timeout,
    ApiError,
}

struct MockRuntime {
    fail_start: bool,
    wait: WaitScript,
    logs: &'static str,
    starts: AtomicUsize,
    removes: AtomicUsize,
}

impl MockRuntime {
    fn new(fail_start: bool, wait: WaitScript) -> Self {
        Self {
            fail_start,
            wait,
            logs: "1 passed",
            starts: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn start(
        &self,
        _name: &str,
        _image: &str,
        _workdir: &Path,
        _command: &str,
        _limits: &ResourceLimits,
    ) -> Result<(), HealError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(HealError::SandboxUnavailable("daemon not running".into()));
        }
        Ok(())
    }

    async fn wait(&self, _name: &str, timeout: Duration) -> Result<i64, HealError> {
        match self.wait {
            WaitScript::Exit(code) => Ok(code),
            WaitScript::Timeout => Err(HealError::SandboxTimeout(timeout.as_secs())),
            WaitScript::ApiError => Err(HealError::SandboxUnavailable("api exploded".into())),
        }
    }

    async fn logs(&self, _name: &str) -> Result<String, HealError> {
        Ok(self.logs.to_string())
    }

    async fn remove(&self, _name: &str) -> Result<(), HealError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn drive(runtime: &MockRuntime) -> (String, i64, Option<HealError>) {
    let dir = tempfile::tempdir().unwrap();
    run_sandboxed(
        runtime,
        "mend-test",
        "python:3.11-slim",
        dir.path(),
        "true",
        &ResourceLimits::default(),
    )
    .await
}

#[tokio::test]
async fn test_teardown_once_on_success() {
    let runtime = MockRuntime::new(false, WaitScript::Exit(0));
    let (logs, code, error) = drive(&runtime).await;
    assert_eq!(logs, "1 passed");
    assert_eq!(code, 0);
    assert!(error.is_none());
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_once_on_failing_suite() {
    let runtime = MockRuntime::new(false, WaitScript::Exit(2));
    let (_, code, error) = drive(&runtime).await;
    assert_eq!(code, 2);
    assert!(error.is_none());
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_once_on_timeout() {
    let runtime = MockRuntime::new(false, WaitScript::Timeout);
    let (logs, code, error) = drive(&runtime).await;
    assert!(matches!(error, Some(HealError::SandboxTimeout(_))));
    assert_eq!(code, 1);
    assert!(logs.contains("timed out"));
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_once_on_api_error() {
    let runtime = MockRuntime::new(false, WaitScript::ApiError);
    let (_, code, error) = drive(&runtime).await;
    assert!(matches!(error, Some(HealError::SandboxUnavailable(_))));
    assert_eq!(code, 1);
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_teardown_when_start_fails() {
    let runtime = MockRuntime::new(true, WaitScript::Exit(0));
    let (logs, code, error) = drive(&runtime).await;
    assert!(matches!(error, Some(HealError::SandboxUnavailable(_))));
    assert_eq!(code, 1);
    assert!(logs.contains("start failed"));
    assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_mode_parsing() {
    assert_eq!(
        SandboxMode::from_str_or_auto("docker"),
        Some(SandboxMode::Docker)
    );
    assert_eq!(SandboxMode::from_str_or_auto("DOCKER"), Some(SandboxMode::Docker));
    assert_eq!(SandboxMode::from_str_or_auto("host"), Some(SandboxMode::Host));
    assert_eq!(SandboxMode::from_str_or_auto("none"), Some(SandboxMode::Host));
    assert_eq!(SandboxMode::from_str_or_auto("auto"), None);
    assert_eq!(SandboxMode::from_str_or_auto(""), None);
}
