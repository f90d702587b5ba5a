//! Execution context lifecycle.
//!
//! The execution context binds the active kernel and its stream so code
//! running inside a cell can find them without having them passed in.
//! It is thread-local: the thread that drives a kernel owns its context,
//! and separate threads (for example parallel test threads) never see
//! each other's.
//!
//! Lifecycle: `UNINITIALIZED -> ACTIVE -> UNINITIALIZED`.
//! [`initialize_context`] refuses to overwrite an active context;
//! [`teardown_context`] is an infallible no-op when nothing is active, so
//! cleanup code can call it on every exit path. [`ContextGuard`] pairs
//! the two around a scope and only ever releases the context it
//! installed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::messaging::stream::Stream;
use crate::runtime::kernel::Kernel;

/// Errors raised by context lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// `initialize_context` was called while a context is active.
    #[error("Execution context already initialized; tear it down first")]
    AlreadyActive,

    /// No context is active on this thread.
    #[error("No active execution context")]
    NoActiveContext,
}

/// The active kernel and the stream it reports on.
#[derive(Clone)]
pub struct ExecutionContext {
    kernel: Arc<dyn Kernel>,
    stream: Arc<dyn Stream>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("app_metadata", self.kernel.app_metadata())
            .field("stream_closed", &self.stream.is_closed())
            .finish()
    }
}

impl ExecutionContext {
    pub fn new(kernel: Arc<dyn Kernel>, stream: Arc<dyn Stream>) -> Self {
        Self { kernel, stream }
    }

    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    pub fn stream(&self) -> &Arc<dyn Stream> {
        &self.stream
    }
}

/// A context together with the install it came from.
struct ActiveContext {
    generation: u64,
    context: ExecutionContext,
}

thread_local! {
    static RUNTIME_CONTEXT: RefCell<Option<ActiveContext>> = const { RefCell::new(None) };
    static NEXT_GENERATION: Cell<u64> = const { Cell::new(0) };
}

/// Install `kernel` and `stream` as this thread's execution context.
pub fn initialize_context(
    kernel: Arc<dyn Kernel>,
    stream: Arc<dyn Stream>,
) -> Result<(), ContextError> {
    install_context(ExecutionContext::new(kernel, stream))
}

/// Install a prebuilt context.
pub fn install_context(context: ExecutionContext) -> Result<(), ContextError> {
    install_generation(context).map(|_| ())
}

/// Install `context` and return the generation that identifies it.
fn install_generation(context: ExecutionContext) -> Result<u64, ContextError> {
    let generation = RUNTIME_CONTEXT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_some() {
            return Err(ContextError::AlreadyActive);
        }
        let generation = NEXT_GENERATION.with(|next| {
            let generation = next.get();
            next.set(generation.wrapping_add(1));
            generation
        });
        *slot = Some(ActiveContext {
            generation,
            context,
        });
        Ok(generation)
    })?;
    log::debug!("[ExecutionContext] context initialized (generation {generation})");
    Ok(generation)
}

/// Clear this thread's execution context and close its stream.
///
/// Never fails. Closing the stream cancels any prompt still waiting on
/// it with an interrupted error.
pub fn teardown_context() {
    release(|_| true);
}

/// Take the active context if `matches` accepts its generation.
fn release(matches: impl Fn(u64) -> bool) {
    let released = RUNTIME_CONTEXT
        .try_with(|cell| {
            let mut slot = cell.borrow_mut();
            match slot.as_ref() {
                Some(active) if matches(active.generation) => slot.take(),
                _ => None,
            }
        })
        .ok()
        .flatten();

    if let Some(ActiveContext { context, .. }) = released {
        if context.stream.awaiting_reply() {
            log::warn!("[ExecutionContext] tearing down while a prompt is pending; it will be interrupted");
        }
        context.stream.close();
        log::debug!("[ExecutionContext] context torn down");
    }
}

/// The active execution context of this thread.
pub fn get_context() -> Result<ExecutionContext, ContextError> {
    RUNTIME_CONTEXT
        .try_with(|cell| cell.borrow().as_ref().map(|active| active.context.clone()))
        .ok()
        .flatten()
        .ok_or(ContextError::NoActiveContext)
}

/// Whether a context is active on this thread.
pub fn context_is_active() -> bool {
    RUNTIME_CONTEXT
        .try_with(|cell| cell.borrow().is_some())
        .unwrap_or(false)
}

/// Scope guard that installs a context and tears it down on drop.
///
/// If the context was already torn down and another one installed in
/// its place, dropping the guard leaves the newer context alone.
/// Not `Send`: the context lives on the thread that installed it.
pub struct ContextGuard {
    context: ExecutionContext,
    generation: u64,
    _thread_bound: PhantomData<*const ()>,
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("context", &self.context)
            .finish()
    }
}

impl ContextGuard {
    pub fn install(kernel: Arc<dyn Kernel>, stream: Arc<dyn Stream>) -> Result<Self, ContextError> {
        let context = ExecutionContext::new(kernel, stream);
        let generation = install_generation(context.clone())?;
        Ok(Self {
            context,
            generation,
            _thread_bound: PhantomData,
        })
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        release(|active| active == generation);
    }
}
