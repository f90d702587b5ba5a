//! Deterministic test harness.
//!
//! [`MockStream`] keeps every op in memory and answers prompts from a
//! script instead of blocking. [`MockedKernel`] wires recording stdout
//! and stderr, an echoing stdin and an [`EchoKernel`] onto a fresh mock
//! stream and installs them as the current execution context until it is
//! dropped. [`ExecRequestFactory`] hides cell id allocation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ast::cell::{CellId, CellIdError, CellManager};
use crate::messaging::ops::{Message, Payload};
use crate::messaging::stream::{Stream, StreamError};
use crate::messaging::streams::{OutputStream, Stdin, StdinMode};
use crate::runtime::context::{ContextError, ContextGuard};
use crate::runtime::kernel::{EchoKernel, Kernel, KernelError, KernelIo};
use crate::runtime::requests::{AppMetadata, ExecutionRequest};
use crate::utilities::config::SessionConfig;

/// Filename reported by kernels built by [`MockedKernel`].
pub const MOCK_APP_FILENAME: &str = "/app/test.py";

/// In-memory stream that captures the ops sent through it.
#[derive(Debug, Default)]
pub struct MockStream {
    messages: Mutex<Vec<Message>>,
    replies: Mutex<VecDeque<String>>,
    closed: AtomicBool,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream whose prompts are answered by `replies`, in order.
    /// Once they run out, reads fail with [`StreamError::Interrupted`].
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stream = Self::new();
        stream
            .replies
            .lock()
            .extend(replies.into_iter().map(Into::into));
        stream
    }

    /// Queue one more prompt reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().push_back(reply.into());
    }

    /// Every message written so far, in order.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Remove and return every message written so far.
    pub fn take_messages(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl Stream for MockStream {
    fn write(&self, op: &str, data: Payload) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::ChannelClosed);
        }
        self.messages.lock().push(Message::new(op, data));
        Ok(())
    }

    fn read_reply(&self) -> Result<String, StreamError> {
        if self.is_closed() {
            return Err(StreamError::Interrupted);
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or(StreamError::Interrupted)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A kernel on a mock stream, installed as the current context.
///
/// Dropping it tears the context down, so tests can build one per case
/// without leaking state into the next.
pub struct MockedKernel {
    pub stream: Arc<MockStream>,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub stdin: Stdin,
    pub k: Arc<EchoKernel>,
    _context: ContextGuard,
}

impl std::fmt::Debug for MockedKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockedKernel")
            .field("stream", &self.stream)
            .field("k", &self.k)
            .finish()
    }
}

impl MockedKernel {
    /// Build the mocks and install the context.
    ///
    /// Fails with [`ContextError::AlreadyActive`] if another context is
    /// still active on this thread.
    pub fn new() -> Result<Self, ContextError> {
        let stream = Arc::new(MockStream::new());
        let config = SessionConfig {
            stdin_mode: StdinMode::Echo,
            record_output: true,
        };
        let io = KernelIo::new(
            stream.clone(),
            &config,
            AppMetadata::new(MOCK_APP_FILENAME),
        );
        let stdout = io.stdout.clone();
        let stderr = io.stderr.clone();
        let stdin = io.stdin.clone();
        let k = Arc::new(EchoKernel::new(io));

        let kernel: Arc<dyn Kernel> = k.clone();
        let context = ContextGuard::install(kernel, stream.clone())?;

        Ok(Self {
            stream,
            stdout,
            stderr,
            stdin,
            k,
            _context: context,
        })
    }

    /// Run requests on the kernel.
    pub fn run(&self, requests: &[ExecutionRequest]) -> Result<(), KernelError> {
        self.k.run(requests)
    }

    /// Every message the kernel has sent so far.
    pub fn messages(&self) -> Vec<Message> {
        self.stream.messages()
    }
}

/// Builds execution requests without the caller managing cell ids.
#[derive(Debug, Default)]
pub struct ExecRequestFactory {
    cell_manager: CellManager,
}

impl ExecRequestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for `code` under a freshly allocated cell id.
    pub fn get(&mut self, code: &str) -> Result<ExecutionRequest, CellIdError> {
        let cell_id = self.cell_manager.create_cell_id()?;
        Ok(ExecutionRequest::new(cell_id, code))
    }

    /// A request for `code` under an existing cell id.
    pub fn get_with_id(&self, cell_id: CellId, code: &str) -> ExecutionRequest {
        ExecutionRequest::new(cell_id, code)
    }
}
