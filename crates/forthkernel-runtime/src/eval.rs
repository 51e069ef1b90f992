//! Host-side evaluation backing the `EVAL` word.
//!
//! Whatever an [`Evaluator`] runs, it runs with the kernel's privileges.
//! Kernels serving untrusted notebooks should start with `allow_eval = false`.

use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("failed to spawn '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("evaluation failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },
}

/// Evaluates a code string in the host environment and stringifies the
/// result.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, code: &str) -> Result<String, EvalError>;
}

/// Runs code through `<shell> -c` and returns its trimmed stdout.
#[derive(Debug, Clone)]
pub struct ShellEvaluator {
    shell: String,
}

impl ShellEvaluator {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Evaluator for ShellEvaluator {
    fn evaluate(&self, code: &str) -> Result<String, EvalError> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EvalError::Spawn {
                shell: self.shell.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EvalError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let eval = ShellEvaluator::new("sh");
        assert_eq!(eval.evaluate("echo hello").unwrap(), "hello");
    }

    #[test]
    fn arithmetic_expansion() {
        let eval = ShellEvaluator::new("sh");
        assert_eq!(eval.evaluate("echo $((6 * 7))").unwrap(), "42");
    }

    #[test]
    fn non_zero_exit_is_error() {
        let eval = ShellEvaluator::new("sh");
        let err = eval.evaluate("echo oops >&2; exit 3").unwrap_err();
        match err {
            EvalError::Failed { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn missing_shell_is_spawn_error() {
        let eval = ShellEvaluator::new("/nonexistent/shell");
        assert!(matches!(
            eval.evaluate("true"),
            Err(EvalError::Spawn { .. })
        ));
    }
}
