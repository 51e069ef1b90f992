use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use forthkernel_common::protocol::{
    CodemirrorMode, CommClose, CommInfoRequest, CommMsg, CommOpen, ExecuteError, ExecuteResult,
    HelpLink, InputReply, InspectRequest, IsCompleteRequest, JsonMap, LanguageInfo, ReplyStatus,
};
use forthkernel_common::{
    CompleteReply, CompleteRequest, ExecuteReply, ExecuteRequest, KernelEvent, KernelInfoReply,
    KernelOptions,
};
use forthkernel_engine::{ErrorCode, ForthEngine};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::bindings::HostServices;
use crate::capture::{capture_output, SharedLineBuffer};
use crate::completion;
use crate::contents::ContentsProvider;
use crate::dictionary::WordDictionary;
use crate::error::{KernelError, Result};
use crate::eval::{Evaluator, ShellEvaluator};
use crate::fold::fold_case;
use crate::session::{EngineLoader, ReferenceLoader, SessionPhase, VmSession};
use crate::{lock, prelude};

pub const IMPLEMENTATION: &str = "forthkernel";
pub const PROTOCOL_VERSION: &str = "5.3";
pub const BANNER: &str = "A Forth kernel";

/// Kernel-info descriptor. Static; never touches the engine.
pub fn kernel_info() -> KernelInfoReply {
    KernelInfoReply {
        implementation: IMPLEMENTATION.to_string(),
        implementation_version: env!("CARGO_PKG_VERSION").to_string(),
        language_info: LanguageInfo {
            codemirror_mode: CodemirrorMode {
                name: "forth".to_string(),
            },
            file_extension: ".fs".to_string(),
            mimetype: "text/x-forth".to_string(),
            name: "forth".to_string(),
            nbconvert_exporter: "text".to_string(),
            pygments_lexer: "forth".to_string(),
            version: "Forth-2012".to_string(),
        },
        protocol_version: PROTOCOL_VERSION.to_string(),
        status: ReplyStatus::Ok,
        banner: BANNER.to_string(),
        help_links: vec![
            HelpLink {
                text: "Forth 2012 Standard".to_string(),
                url: "https://forth-standard.org".to_string(),
            },
            HelpLink {
                text: "forthkernel".to_string(),
                url: env!("CARGO_PKG_REPOSITORY").to_string(),
            },
        ],
    }
}

/// Human-readable form of an engine error code.
pub fn describe_error(code: ErrorCode) -> String {
    match code {
        ErrorCode::Quit => format!("Error: Quit ({code})"),
        ErrorCode::Abort => format!("Error: Abort ({code})"),
        ErrorCode::EndOfInput => format!("Error: End of input ({code})"),
        ErrorCode::Bye => format!("Error: Bye ({code})"),
        ErrorCode::Unknown => format!("Unknown Error ({code})"),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Configures and starts a [`ForthKernel`].
pub struct KernelBuilder {
    options: KernelOptions,
    loader: Arc<dyn EngineLoader>,
    contents: Option<Arc<dyn ContentsProvider>>,
    evaluator: Option<Arc<dyn Evaluator>>,
}

impl KernelBuilder {
    pub fn new(options: KernelOptions) -> Self {
        Self {
            options,
            loader: Arc::new(ReferenceLoader),
            contents: None,
            evaluator: None,
        }
    }

    pub fn loader(mut self, loader: Arc<dyn EngineLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Enables `INCLUDE`.
    pub fn contents(mut self, contents: Arc<dyn ContentsProvider>) -> Self {
        self.contents = Some(contents);
        self
    }

    /// Replaces the default shell evaluator behind `EVAL`.
    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Start the kernel. Session initialization continues in the
    /// background; every request waits for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<(ForthKernel, UnboundedReceiver<KernelEvent>)> {
        let runtime = Handle::try_current().map_err(|_| KernelError::NoRuntime)?;
        let (events, receiver) = unbounded_channel();

        let evaluator = if self.options.allow_eval {
            let shell = self.options.eval_shell.clone();
            Some(self.evaluator.unwrap_or_else(|| {
                Arc::new(ShellEvaluator::new(shell)) as Arc<dyn Evaluator>
            }))
        } else {
            None
        };

        let services = HostServices {
            events: events.clone(),
            evaluator,
            contents: self.contents,
            runtime: runtime.clone(),
            options: self.options.clone(),
        };
        let session = VmSession::start(&runtime, self.loader, services);
        tracing::info!(session = %session.id(), "kernel starting");

        let kernel = ForthKernel {
            session,
            options: self.options,
            events,
            execution_count: AtomicU32::new(0),
        };
        Ok((kernel, receiver))
    }
}

// ============================================================================
// Kernel
// ============================================================================

/// What one execute cycle observed on the engine thread.
struct CycleOutcome {
    result: std::result::Result<(), ErrorCode>,
    /// Word listing, taken only when the engine ended in interpret mode.
    listing: Option<String>,
    status: String,
}

/// Interpret a cell and run the follow-up queries, all in one pass over
/// the engine.
fn execute_cycle(
    engine: &mut dyn ForthEngine,
    code: &str,
    silent: bool,
    output: &SharedLineBuffer,
) -> CycleOutcome {
    let result = engine.interpret(code, silent);
    lock(output).flush();

    if result.is_err() {
        return CycleOutcome {
            result,
            listing: None,
            status: String::new(),
        };
    }

    let mode = capture_output(engine, prelude::MODE_WORD).output;
    let listing = if mode.trim() == "interpret" {
        Some(capture_output(engine, prelude::WORDS_QUERY).output)
    } else {
        None
    };
    let status = capture_output(engine, prelude::STATUS_WORD)
        .output
        .trim()
        .to_string();

    CycleOutcome {
        result,
        listing,
        status,
    }
}

/// The kernel: one session, one request at a time.
pub struct ForthKernel {
    session: VmSession,
    options: KernelOptions,
    events: UnboundedSender<KernelEvent>,
    execution_count: AtomicU32,
}

impl ForthKernel {
    pub fn kernel_info(&self) -> KernelInfoReply {
        kernel_info()
    }

    pub fn options(&self) -> &KernelOptions {
        &self.options
    }

    pub fn session(&self) -> &VmSession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub async fn ready(&self) -> Result<()> {
        self.session.ready().await
    }

    pub fn execution_count(&self) -> u32 {
        self.execution_count.load(Ordering::SeqCst)
    }

    pub fn dictionary(&self) -> WordDictionary {
        self.session.dictionary_snapshot()
    }

    /// Execute one cell.
    ///
    /// Forth errors come back as an error reply (and an `error` event);
    /// `Err` is reserved for session-level failures.
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteReply> {
        self.session.ready().await?;
        let count = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;

        let code = if self.options.case_sensitive {
            request.code.clone()
        } else {
            fold_case(&request.code)
        };
        let silent = self.options.silent;
        let output = self.session.output();
        tracing::debug!(execution_count = count, "executing cell");

        let cycle = self
            .session
            .run(move |engine| execute_cycle(engine, &code, silent, &output))
            .await?;

        match cycle.result {
            Ok(()) => {
                if let Some(listing) = &cycle.listing {
                    self.session.update_dictionary(listing);
                }
                self.publish(KernelEvent::ExecuteResult(ExecuteResult::plain_text(
                    count,
                    cycle.status,
                )));
                Ok(ExecuteReply::Ok {
                    execution_count: count,
                    user_expressions: JsonMap::new(),
                })
            }
            Err(code) => {
                let evalue = describe_error(code);
                tracing::debug!(execution_count = count, error = %evalue, "cell failed");
                self.publish(KernelEvent::ExecuteError(ExecuteError {
                    ename: "Error".to_string(),
                    evalue: evalue.clone(),
                    traceback: Vec::new(),
                }));
                Ok(ExecuteReply::Error {
                    execution_count: count,
                    ename: "Error".to_string(),
                    evalue,
                    traceback: Vec::new(),
                })
            }
        }
    }

    /// Complete the word at the cursor from the dictionary snapshot and the
    /// buffer's own definitions. No engine call is made.
    pub async fn complete(&self, request: &CompleteRequest) -> Result<CompleteReply> {
        self.session.ready().await?;
        Ok(self.session.with_dictionary(|dictionary| {
            completion::complete(dictionary, &request.code, request.cursor_pos)
        }))
    }

    pub fn inspect(&self, _request: &InspectRequest) -> Result<JsonMap> {
        Err(KernelError::NotImplemented("inspect_request"))
    }

    pub fn is_complete(&self, _request: &IsCompleteRequest) -> Result<JsonMap> {
        Err(KernelError::NotImplemented("is_complete_request"))
    }

    pub fn comm_info(&self, _request: &CommInfoRequest) -> Result<JsonMap> {
        Err(KernelError::NotImplemented("comm_info_request"))
    }

    pub fn input_reply(&self, _reply: &InputReply) -> Result<()> {
        Err(KernelError::NotImplemented("input_reply"))
    }

    pub fn comm_open(&self, _msg: &CommOpen) -> Result<()> {
        Err(KernelError::NotImplemented("comm_open"))
    }

    pub fn comm_msg(&self, _msg: &CommMsg) -> Result<()> {
        Err(KernelError::NotImplemented("comm_msg"))
    }

    pub fn comm_close(&self, _msg: &CommClose) -> Result<()> {
        Err(KernelError::NotImplemented("comm_close"))
    }

    /// Dispose the session. Returns false if it was already disposed.
    pub async fn dispose(&self) -> bool {
        self.session.dispose().await
    }

    fn publish(&self, event: KernelEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}
