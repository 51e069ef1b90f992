use std::fmt;

use thiserror::Error;

/// Outcome class of a failed interpretation, as reported to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown = 1,
    Quit = 2,
    Abort = 3,
    EndOfInput = 4,
    Bye = 5,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised while the engine executes words.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("return stack underflow")]
    ReturnStackUnderflow,

    #[error("undefined word: {0}")]
    UndefinedWord(String),

    #[error("{0} is compile-only")]
    CompileOnly(String),

    #[error("no definition in progress")]
    NoDefinition,

    #[error("unbalanced control structure in {0}")]
    ControlMismatch(String),

    #[error("invalid memory address {0}")]
    InvalidAddress(i64),

    #[error("data space exhausted ({0} bytes requested)")]
    DataSpaceExhausted(i64),

    #[error("field width {0} out of range")]
    FieldWidth(i64),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unexpected end of input")]
    EndOfInput,

    #[error("max call depth exceeded ({0})")]
    CallDepth(usize),

    #[error("{name}: {message}")]
    Host { name: String, message: String },

    /// A nested interpretation (host-initiated) failed; its diagnostic has
    /// already been emitted.
    #[error("nested interpretation failed ({0})")]
    Interpretation(ErrorCode),

    #[error("aborted")]
    Aborted,

    #[error("quit")]
    Quit,

    #[error("bye")]
    Bye,
}

impl EngineError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            EngineError::Quit => ErrorCode::Quit,
            EngineError::Bye => ErrorCode::Bye,
            EngineError::EndOfInput => ErrorCode::EndOfInput,
            EngineError::Interpretation(code) => *code,
            _ => ErrorCode::Abort,
        }
    }

    /// Text to emit on the output sink when this error ends an
    /// interpretation, if any.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            EngineError::Quit
            | EngineError::Bye
            | EngineError::Aborted
            | EngineError::Interpretation(_) => None,
            other => Some(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Unknown.code(), 1);
        assert_eq!(ErrorCode::Quit.code(), 2);
        assert_eq!(ErrorCode::Abort.code(), 3);
        assert_eq!(ErrorCode::EndOfInput.code(), 4);
        assert_eq!(ErrorCode::Bye.code(), 5);
        assert_eq!(ErrorCode::Abort.to_string(), "3");
    }

    #[test]
    fn classification() {
        assert_eq!(EngineError::StackUnderflow.error_code(), ErrorCode::Abort);
        assert_eq!(EngineError::EndOfInput.error_code(), ErrorCode::EndOfInput);
        assert_eq!(
            EngineError::Interpretation(ErrorCode::Bye).error_code(),
            ErrorCode::Bye
        );
    }

    #[test]
    fn diagnostics() {
        assert_eq!(
            EngineError::UndefinedWord("FOO".into()).diagnostic().as_deref(),
            Some("undefined word: FOO")
        );
        assert_eq!(EngineError::Quit.diagnostic(), None);
        assert_eq!(EngineError::Aborted.diagnostic(), None);
    }
}
