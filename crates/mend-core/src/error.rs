use thiserror::Error;

/// Expected failure conditions of a healing session.
///
/// Most variants poison a single attempt; the loop may still continue with
/// the next iteration. [`HealError::GuardRejection`] aborts the whole
/// session, and [`HealError::PushFailed`] leaves the local commit in place
/// and downgrades the session to a partial result rather than a failure.
#[derive(Debug, Clone, Error)]
pub enum HealError {
    #[error("no test files discovered in the repository")]
    DiscoveryEmpty,

    #[error("sandbox substrate unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("sandbox execution timed out after {0}s")]
    SandboxTimeout(u64),

    #[error("model call failed: {0}")]
    SynthesisCall(String),

    #[error("model output unparseable: {0}")]
    SynthesisParse(String),

    #[error("branch guard rejected {branch:?}: {reason}")]
    GuardRejection { branch: String, reason: String },

    #[error("git push failed for {branch}: {detail}")]
    PushFailed { branch: String, detail: String },

    #[error("git command failed: {0}")]
    GitCommand(String),

    #[error("io failure: {0}")]
    Io(String),
}

impl HealError {
    /// Errors that invalidate every remaining attempt, not just this one.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::GuardRejection { .. })
    }

    /// Push failures keep the local commit; the session ends partial
    /// instead of failed.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::PushFailed { .. })
    }
}

impl From<std::io::Error> for HealError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
