use thiserror::Error;

/// Errors surfaced by the browser session.
#[derive(Clone, Debug, Error)]
pub enum SessionError {
    /// The page did not fire its load event within the caller's deadline.
    /// Recoverable: callers may keep collecting on degraded data.
    #[error("navigation timed out")]
    NavTimeout,
    #[error("failed to launch chromium: {0}")]
    Launch(String),
    #[error("cdp i/o failure: {0}")]
    CdpIo(String),
    #[error("script evaluation failed: {0}")]
    Evaluate(String),
    #[error("internal session error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn is_nav_timeout(&self) -> bool {
        matches!(self, SessionError::NavTimeout)
    }
}
