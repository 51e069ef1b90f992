//! Host capabilities exposed to Forth code as dictionary words.

use std::sync::Arc;

use forthkernel_common::protocol::Alert;
use forthkernel_common::{KernelEvent, KernelOptions};
use forthkernel_engine::{EngineError, ForthEngine, HostFn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;

use crate::contents::ContentsProvider;
use crate::eval::Evaluator;
use crate::fold::fold_case;

/// Everything the bindings reach out to.
#[derive(Clone)]
pub struct HostServices {
    pub events: UnboundedSender<KernelEvent>,
    /// `None` disables `EVAL`.
    pub evaluator: Option<Arc<dyn Evaluator>>,
    /// `None` disables `INCLUDE`.
    pub contents: Option<Arc<dyn ContentsProvider>>,
    /// Runtime the `INCLUDE` fetch is driven on.
    pub runtime: Handle,
    pub options: KernelOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Eval,
    Log,
    Alert,
    Include,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Eval,
        Capability::Log,
        Capability::Alert,
        Capability::Include,
    ];

    /// The dictionary word the capability is bound as.
    pub fn name(self) -> &'static str {
        match self {
            Capability::Eval => "EVAL",
            Capability::Log => "LOG",
            Capability::Alert => "ALERT",
            Capability::Include => "INCLUDE",
        }
    }

    pub fn enabled(self, services: &HostServices) -> bool {
        match self {
            Capability::Eval => services.options.allow_eval && services.evaluator.is_some(),
            Capability::Log | Capability::Alert => true,
            Capability::Include => services.contents.is_some(),
        }
    }

    fn host_fn(self, services: &HostServices) -> Option<HostFn> {
        match self {
            Capability::Eval => services.evaluator.clone().map(eval_fn),
            Capability::Log => Some(log_fn()),
            Capability::Alert => Some(alert_fn(services.events.clone())),
            Capability::Include => services.contents.clone().map(|contents| {
                include_fn(contents, services.runtime.clone(), services.options.clone())
            }),
        }
    }
}

/// The enabled capabilities of a session and their host functions.
pub struct CapabilityTable {
    entries: Vec<(Capability, HostFn)>,
}

impl CapabilityTable {
    pub fn from_services(services: &HostServices) -> Self {
        let entries = Capability::ALL
            .into_iter()
            .filter(|cap| cap.enabled(services))
            .filter_map(|cap| cap.host_fn(services).map(|f| (cap, f)))
            .collect();
        Self { entries }
    }

    pub fn install(&self, engine: &mut dyn ForthEngine) {
        for (cap, func) in &self.entries {
            engine.bind(cap.name(), Arc::clone(func));
            tracing::debug!(word = cap.name(), "bound host capability");
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(cap, _)| cap.name()).collect()
    }
}

/// `EVAL ( c-addr u -- c-addr u )`. Evaluation failures are logged and
/// yield an empty string; they never reach the engine's error path.
fn eval_fn(evaluator: Arc<dyn Evaluator>) -> HostFn {
    Arc::new(move |engine: &mut dyn ForthEngine| -> forthkernel_engine::Result<()> {
        let code = engine.pop_string()?;
        let result = evaluator.evaluate(&code).unwrap_or_else(|err| {
            tracing::error!(code = %code, error = %err, "EVAL failed");
            String::new()
        });
        engine.push_string(&result);
        Ok(())
    })
}

/// `LOG ( c-addr u -- )`
fn log_fn() -> HostFn {
    Arc::new(|engine: &mut dyn ForthEngine| -> forthkernel_engine::Result<()> {
        let message = engine.pop_string()?;
        tracing::info!(target: "forth", "{message}");
        Ok(())
    })
}

/// `ALERT ( c-addr u -- )`
fn alert_fn(events: UnboundedSender<KernelEvent>) -> HostFn {
    Arc::new(move |engine: &mut dyn ForthEngine| -> forthkernel_engine::Result<()> {
        let message = engine.pop_string()?;
        if events
            .send(KernelEvent::Alert(Alert { message }))
            .is_err()
        {
            tracing::warn!("event receiver dropped; alert discarded");
        }
        Ok(())
    })
}

/// `INCLUDE ( c-addr u -- )`. Blocks the calling (engine) thread until the
/// file has been fetched and interpreted, so the enclosing cell only
/// finishes after the included source has run.
fn include_fn(
    contents: Arc<dyn ContentsProvider>,
    runtime: Handle,
    options: KernelOptions,
) -> HostFn {
    Arc::new(move |engine: &mut dyn ForthEngine| -> forthkernel_engine::Result<()> {
        let filename = engine.pop_string()?;
        let path = options.resolve_include(&filename);
        tracing::debug!(%path, "including");

        let source = runtime.block_on(contents.get(&path)).map_err(|err| {
            tracing::warn!(%path, error = %err, "INCLUDE failed");
            EngineError::Host {
                name: "INCLUDE".to_string(),
                message: err.to_string(),
            }
        })?;
        let source = if options.case_sensitive {
            source
        } else {
            fold_case(&source)
        };

        engine
            .interpret(&source, true)
            .map_err(EngineError::Interpretation)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use forthkernel_engine::{ErrorCode, Interpreter};
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;
    use crate::contents::ContentsError;
    use crate::eval::EvalError;

    struct Upper;

    impl Evaluator for Upper {
        fn evaluate(&self, code: &str) -> Result<String, EvalError> {
            Ok(code.to_uppercase())
        }
    }

    struct Broken;

    impl Evaluator for Broken {
        fn evaluate(&self, _code: &str) -> Result<String, EvalError> {
            Err(EvalError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "boom".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Files {
        files: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentsProvider for Files {
        async fn get(&self, path: &str) -> Result<String, ContentsError> {
            self.requested.lock().unwrap().push(path.to_string());
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| ContentsError::NoContent(path.to_string()))
        }
    }

    fn services(runtime: &tokio::runtime::Runtime) -> HostServices {
        let (events, _) = unbounded_channel();
        HostServices {
            events,
            evaluator: None,
            contents: None,
            runtime: runtime.handle().clone(),
            options: KernelOptions::default(),
        }
    }

    fn engine_with(table: &CapabilityTable) -> (Interpreter, Arc<Mutex<String>>) {
        let out = Arc::new(Mutex::new(String::new()));
        let out_clone = out.clone();
        let mut forth = Interpreter::new();
        drop(forth.replace_sink(Box::new(move |c| out_clone.lock().unwrap().push(c))));
        table.install(&mut forth);
        (forth, out)
    }

    #[test]
    fn table_respects_configuration() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut services = services(&runtime);
        let table = CapabilityTable::from_services(&services);
        assert_eq!(table.names(), vec!["LOG", "ALERT"]);

        services.evaluator = Some(Arc::new(Upper));
        services.contents = Some(Arc::new(Files::default()));
        let table = CapabilityTable::from_services(&services);
        assert_eq!(table.names(), vec!["EVAL", "LOG", "ALERT", "INCLUDE"]);

        services.options.allow_eval = false;
        let table = CapabilityTable::from_services(&services);
        assert_eq!(table.names(), vec!["LOG", "ALERT", "INCLUDE"]);
    }

    #[test]
    fn eval_pushes_result() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut services = services(&runtime);
        services.evaluator = Some(Arc::new(Upper));
        let (mut forth, out) = engine_with(&CapabilityTable::from_services(&services));

        forth.interpret("S\" shout\" EVAL TYPE", true).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "SHOUT");
    }

    #[test]
    fn eval_failure_yields_empty_string() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut services = services(&runtime);
        services.evaluator = Some(Arc::new(Broken));
        let (mut forth, _) = engine_with(&CapabilityTable::from_services(&services));

        assert_eq!(forth.interpret("S\" anything\" EVAL NIP", true), Ok(()));
        assert_eq!(forth.stack(), [0]);
    }

    #[test]
    fn alert_publishes_event() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (events, mut rx) = unbounded_channel();
        let services = HostServices {
            events,
            ..services(&runtime)
        };
        let (mut forth, _) = engine_with(&CapabilityTable::from_services(&services));

        forth.interpret("S\" careful\" ALERT", true).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            KernelEvent::Alert(Alert {
                message: "careful".to_string()
            })
        );
    }

    #[test]
    fn include_resolves_against_base_path() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let files = Arc::new(Files {
            files: HashMap::from([
                ("lib/square.fs".to_string(), ": square dup * ;".to_string()),
                ("/abs.fs".to_string(), "7".to_string()),
            ]),
            ..Files::default()
        });
        let mut services = services(&runtime);
        services.contents = Some(files.clone());
        services.options.base_path = "lib".to_string();
        let (mut forth, out) = engine_with(&CapabilityTable::from_services(&services));

        forth
            .interpret("S\" square.fs\" INCLUDE 5 SQUARE . S\" /abs.fs\" INCLUDE .", true)
            .unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "25 7 ");
        assert_eq!(
            *files.requested.lock().unwrap(),
            vec!["lib/square.fs", "/abs.fs"]
        );
    }

    #[test]
    fn included_source_keeps_literal_case() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let files = Arc::new(Files {
            files: HashMap::from([(
                "greet.fs".to_string(),
                ": greet .\" Hi there\" ; greet".to_string(),
            )]),
            ..Files::default()
        });
        let mut services = services(&runtime);
        services.contents = Some(files);
        let (mut forth, out) = engine_with(&CapabilityTable::from_services(&services));

        forth.interpret("S\" greet.fs\" INCLUDE GREET", true).unwrap();
        assert_eq!(out.lock().unwrap().as_str(), "Hi thereHi there");
    }

    #[test]
    fn include_failure_aborts() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut services = services(&runtime);
        services.contents = Some(Arc::new(Files::default()));
        let (mut forth, out) = engine_with(&CapabilityTable::from_services(&services));

        assert_eq!(
            forth.interpret("S\" missing.fs\" INCLUDE 1 .", true),
            Err(ErrorCode::Abort)
        );
        let text = out.lock().unwrap().clone();
        assert!(text.contains("INCLUDE:"));
        assert!(!text.contains("1 "));
    }
}
