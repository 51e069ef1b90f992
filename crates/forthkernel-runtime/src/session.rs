use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use forthkernel_engine::{ForthEngine, Interpreter};
use tokio::runtime::Handle;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::bindings::{CapabilityTable, HostServices};
use crate::capture::{capture_output, stream_sink, LineBuffer, SharedLineBuffer};
use crate::dictionary::WordDictionary;
use crate::error::{KernelError, Result};
use crate::{lock, prelude};

/// Produces the engine a session drives.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn ForthEngine>>;
}

/// Loads the bundled reference [`Interpreter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceLoader;

#[async_trait]
impl EngineLoader for ReferenceLoader {
    async fn load(&self) -> Result<Box<dyn ForthEngine>> {
        Ok(Box::new(Interpreter::new()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    PreludeRunning,
    Ready,
    Failed,
    Disposed,
}

type SharedPhase = Arc<Mutex<SessionPhase>>;

fn set_phase(phase: &SharedPhase, next: SessionPhase) {
    let mut current = lock(phase);
    if *current != SessionPhase::Disposed {
        *current = next;
    }
}

enum Lifecycle {
    Starting(JoinHandle<Result<Box<dyn ForthEngine>>>),
    Ready(Box<dyn ForthEngine>),
    /// The engine is out on the blocking pool.
    Busy,
    Failed(String),
    Disposed,
}

// ============================================================================
// VmSession
// ============================================================================

/// Owns one engine for the lifetime of a kernel.
///
/// Construction spawns initialization (load, bind capabilities, run the
/// prelude) and returns immediately; [`VmSession::ready`] waits for it.
/// Every engine call runs on the blocking pool via [`VmSession::run`].
pub struct VmSession {
    id: Uuid,
    phase: SharedPhase,
    lifecycle: Arc<tokio::sync::Mutex<Lifecycle>>,
    dictionary: RwLock<WordDictionary>,
    output: SharedLineBuffer,
}

impl VmSession {
    pub fn start(
        runtime: &Handle,
        loader: Arc<dyn EngineLoader>,
        services: HostServices,
    ) -> Self {
        let id = Uuid::new_v4();
        let phase = Arc::new(Mutex::new(SessionPhase::Uninitialized));
        let output = LineBuffer::shared(services.events.clone());

        let task_phase = Arc::clone(&phase);
        let task_output = Arc::clone(&output);
        let handle = runtime.spawn(async move {
            let result = initialize(loader, services, task_output, &task_phase).await;
            match &result {
                Ok(_) => {
                    set_phase(&task_phase, SessionPhase::Ready);
                    tracing::info!(session = %id, "session ready");
                }
                Err(err) => {
                    set_phase(&task_phase, SessionPhase::Failed);
                    tracing::error!(session = %id, error = %err, "session failed to start");
                }
            }
            result
        });

        Self {
            id,
            phase,
            lifecycle: Arc::new(tokio::sync::Mutex::new(Lifecycle::Starting(handle))),
            dictionary: RwLock::new(WordDictionary::new()),
            output,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    /// Wait for initialization to finish.
    ///
    /// Resolves once; afterwards every call returns the same outcome. A
    /// failed start is reported as [`KernelError::SessionFailed`].
    pub async fn ready(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        settle(&mut lifecycle, &self.phase).await
    }

    /// Run `f` against the engine on the blocking pool, after waiting for
    /// the session to become ready.
    ///
    /// The round trip happens in a task that owns the lifecycle lock, so
    /// the engine is put back even if the returned future is dropped.
    pub async fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn ForthEngine) -> R + Send + 'static,
        R: Send + 'static,
    {
        let lifecycle = Arc::clone(&self.lifecycle).lock_owned().await;
        let task = tokio::spawn(run_locked(lifecycle, Arc::clone(&self.phase), self.id, f));
        task.await.unwrap_or_else(|err| {
            tracing::error!(session = %self.id, error = %err, "engine task failed");
            Err(KernelError::EngineLost)
        })
    }

    /// Drop the engine. Returns false if the session was already disposed.
    pub async fn dispose(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Disposed);
        if let Lifecycle::Disposed = previous {
            return false;
        }
        if let Lifecycle::Starting(handle) = &previous {
            handle.abort();
        }
        drop(previous);

        *lock(&self.phase) = SessionPhase::Disposed;
        lock(&self.output).flush();
        self.dictionary
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        tracing::info!(session = %self.id, "session disposed");
        true
    }

    pub fn output(&self) -> SharedLineBuffer {
        Arc::clone(&self.output)
    }

    pub fn with_dictionary<R>(&self, f: impl FnOnce(&WordDictionary) -> R) -> R {
        let dictionary = self
            .dictionary
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&dictionary)
    }

    pub fn dictionary_snapshot(&self) -> WordDictionary {
        self.with_dictionary(WordDictionary::clone)
    }

    pub(crate) fn update_dictionary(&self, listing: &str) {
        self.dictionary
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace_from_listing(listing);
    }
}

/// Resolve a pending start, then report whether the engine is available.
async fn settle(lifecycle: &mut Lifecycle, phase: &SharedPhase) -> Result<()> {
    if let Lifecycle::Starting(handle) = lifecycle {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(err) => Err(KernelError::SessionFailed(format!(
                "initialization task failed: {err}"
            ))),
        };
        *lifecycle = match outcome {
            Ok(engine) => Lifecycle::Ready(engine),
            Err(KernelError::SessionFailed(message)) => {
                set_phase(phase, SessionPhase::Failed);
                Lifecycle::Failed(message)
            }
            Err(other) => {
                set_phase(phase, SessionPhase::Failed);
                Lifecycle::Failed(other.to_string())
            }
        };
    }

    match lifecycle {
        Lifecycle::Ready(_) => Ok(()),
        Lifecycle::Failed(message) => Err(KernelError::SessionFailed(message.clone())),
        Lifecycle::Disposed => Err(KernelError::Disposed),
        Lifecycle::Busy | Lifecycle::Starting(_) => Err(KernelError::EngineLost),
    }
}

async fn run_locked<R, F>(
    mut lifecycle: OwnedMutexGuard<Lifecycle>,
    phase: SharedPhase,
    id: Uuid,
    f: F,
) -> Result<R>
where
    F: FnOnce(&mut dyn ForthEngine) -> R + Send + 'static,
    R: Send + 'static,
{
    settle(&mut lifecycle, &phase).await?;

    let Lifecycle::Ready(mut engine) = std::mem::replace(&mut *lifecycle, Lifecycle::Busy) else {
        return Err(KernelError::EngineLost);
    };

    let outcome = tokio::task::spawn_blocking(move || {
        let value = f(engine.as_mut());
        (engine, value)
    })
    .await;

    match outcome {
        Ok((engine, value)) => {
            *lifecycle = Lifecycle::Ready(engine);
            Ok(value)
        }
        Err(err) => {
            tracing::error!(session = %id, error = %err, "engine call panicked");
            *lifecycle = Lifecycle::Failed("engine call panicked".to_string());
            set_phase(&phase, SessionPhase::Failed);
            Err(KernelError::EngineLost)
        }
    }
}

async fn initialize(
    loader: Arc<dyn EngineLoader>,
    services: HostServices,
    output: SharedLineBuffer,
    phase: &SharedPhase,
) -> Result<Box<dyn ForthEngine>> {
    set_phase(phase, SessionPhase::Loading);
    let mut engine = loader
        .load()
        .await
        .map_err(|err| KernelError::SessionFailed(err.to_string()))?;
    drop(engine.replace_sink(stream_sink(&output)));

    set_phase(phase, SessionPhase::PreludeRunning);
    let table = CapabilityTable::from_services(&services);
    tokio::task::spawn_blocking(move || {
        table.install(engine.as_mut());
        let captured = capture_output(engine.as_mut(), &prelude::source(&table.names()));
        match captured.result {
            Ok(()) => Ok(engine),
            Err(code) => Err(KernelError::SessionFailed(format!(
                "prelude failed with code {code}: {}",
                captured.output.trim()
            ))),
        }
    })
    .await
    .map_err(|err| KernelError::SessionFailed(format!("prelude task failed: {err}")))?
}
