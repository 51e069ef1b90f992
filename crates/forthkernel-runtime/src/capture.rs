//! Reshaping engine output.
//!
//! In the default mode every emitted character goes through a [`LineBuffer`]
//! that publishes each completed line as a stdout stream event. Internal
//! queries run inside a [`CaptureScope`], which points the engine at an
//! in-memory accumulator and puts the previous sink back when dropped.

use std::sync::{Arc, Mutex};

use forthkernel_common::{KernelEvent, StreamChunk};
use forthkernel_engine::{EmitSink, ErrorCode, ForthEngine};
use tokio::sync::mpsc::UnboundedSender;

use crate::lock;

/// Accumulates characters until a newline, then publishes the line.
pub struct LineBuffer {
    pending: String,
    events: UnboundedSender<KernelEvent>,
}

pub type SharedLineBuffer = Arc<Mutex<LineBuffer>>;

impl LineBuffer {
    pub fn new(events: UnboundedSender<KernelEvent>) -> Self {
        Self {
            pending: String::new(),
            events,
        }
    }

    pub fn shared(events: UnboundedSender<KernelEvent>) -> SharedLineBuffer {
        Arc::new(Mutex::new(Self::new(events)))
    }

    pub fn push(&mut self, c: char) {
        self.pending.push(c);
        if c == '\n' {
            self.flush();
        }
    }

    /// Publish whatever is pending, complete line or not.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        if self
            .events
            .send(KernelEvent::Stream(StreamChunk::stdout(text)))
            .is_err()
        {
            tracing::trace!("event receiver dropped; discarding output");
        }
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }
}

/// An emission sink feeding `buffer`.
pub fn stream_sink(buffer: &SharedLineBuffer) -> EmitSink {
    let buffer = Arc::clone(buffer);
    Box::new(move |c| lock(&buffer).push(c))
}

/// Redirects engine output into a string for as long as it lives.
pub struct CaptureScope<'a> {
    engine: &'a mut dyn ForthEngine,
    saved: Option<EmitSink>,
    output: Arc<Mutex<String>>,
}

impl<'a> CaptureScope<'a> {
    pub fn new(engine: &'a mut dyn ForthEngine) -> Self {
        let output = Arc::new(Mutex::new(String::new()));
        let accumulator = Arc::clone(&output);
        let saved = engine.replace_sink(Box::new(move |c| lock(&accumulator).push(c)));
        Self {
            engine,
            saved: Some(saved),
            output,
        }
    }

    pub fn interpret(&mut self, code: &str) -> Result<(), ErrorCode> {
        self.engine.interpret(code, true)
    }

    /// End the capture, restoring the previous sink, and return what was
    /// emitted.
    pub fn finish(self) -> String {
        std::mem::take(&mut *lock(&self.output))
    }
}

impl Drop for CaptureScope<'_> {
    fn drop(&mut self) {
        if let Some(sink) = self.saved.take() {
            drop(self.engine.replace_sink(sink));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub output: String,
    pub result: Result<(), ErrorCode>,
}

/// Interpret `code` silently, collecting its output instead of streaming it.
pub fn capture_output(engine: &mut dyn ForthEngine, code: &str) -> Captured {
    let mut scope = CaptureScope::new(engine);
    let result = scope.interpret(code);
    Captured {
        output: scope.finish(),
        result,
    }
}
