use thiserror::Error;

/// Kernel-level failures.
///
/// Errors raised by Forth code never show up here; they are reported as an
/// error execute reply and the session stays usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Engine load or prelude failure. The session can never become ready;
    /// the host should recreate the kernel.
    #[error("session failed to start: {0}")]
    SessionFailed(String),

    #[error("session has been disposed")]
    Disposed,

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// A VM call panicked and took the engine with it.
    #[error("engine lost while handling a request")]
    EngineLost,

    #[error("kernel must be started from within a tokio runtime")]
    NoRuntime,

    #[error("engine load error: {0}")]
    EngineLoad(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = KernelError::NotImplemented("inspect_request");
        assert_eq!(e.to_string(), "inspect_request is not implemented");
    }

    #[test]
    fn session_failure_display() {
        let e = KernelError::SessionFailed("prelude failed".to_string());
        assert_eq!(e.to_string(), "session failed to start: prelude failed");
    }
}
