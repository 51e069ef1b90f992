//! A notebook kernel around an embedded Forth engine.
//!
//! [`ForthKernel`] turns protocol requests into engine calls: it executes
//! cells, reshapes engine output into stream events, keeps the word list
//! for completion and binds host capabilities (`EVAL`, `LOG`, `ALERT`,
//! `INCLUDE`) into the engine's dictionary.

pub mod bindings;
pub mod capture;
pub mod completion;
pub mod contents;
pub mod dictionary;
pub mod error;
pub mod eval;
pub mod fold;
pub mod kernel;
pub mod prelude;
pub mod session;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use contents::{ContentsError, ContentsProvider, FsContents, HttpContents};
pub use error::{KernelError, Result};
pub use eval::{EvalError, Evaluator, ShellEvaluator};
pub use kernel::{ForthKernel, KernelBuilder};
pub use session::{EngineLoader, ReferenceLoader, SessionPhase, VmSession};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
