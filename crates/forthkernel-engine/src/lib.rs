//! The engine side of the kernel.
//!
//! [`ForthEngine`] is the narrow surface the kernel drives: interpret source,
//! exchange values and strings on the data stack, bind host callables as
//! words and redirect character output. [`Interpreter`] is a compact
//! reference engine implementing it.

pub mod error;
mod input;
pub mod interpreter;
mod word;

use std::sync::Arc;

pub use error::{EngineError, ErrorCode, Result};
pub use interpreter::Interpreter;

/// Receives every character the engine emits.
pub type EmitSink = Box<dyn FnMut(char) + Send>;

/// A host callable installed as a dictionary word.
///
/// It receives the engine it was invoked from and communicates through the
/// data stack. Returning an error aborts the enclosing interpretation.
pub type HostFn = Arc<dyn Fn(&mut dyn ForthEngine) -> Result<()> + Send + Sync>;

/// An embedded Forth virtual machine.
pub trait ForthEngine: Send {
    /// Install `func` as the word `name`.
    fn bind(&mut self, name: &str, func: HostFn);

    /// Interpret `code` to the end of its input.
    ///
    /// When `silent` is false the engine reports " ok" (or " compiled") on
    /// success. Calls made from inside a host function interpret at the
    /// point of the call and never report.
    fn interpret(&mut self, code: &str, silent: bool) -> std::result::Result<(), ErrorCode>;

    fn push(&mut self, value: i64);

    fn pop(&mut self) -> Result<i64>;

    /// Pop a `c-addr u` pair and read the string it designates.
    fn pop_string(&mut self) -> Result<String>;

    /// Copy `s` into engine memory and push its `c-addr u` pair.
    fn push_string(&mut self, s: &str);

    /// Swap the character-emission sink, returning the previous one.
    #[must_use = "the previous sink is returned so it can be restored"]
    fn replace_sink(&mut self, sink: EmitSink) -> EmitSink;
}
