//! # kernel-io
//!
//! Stream redirection and execution-context plumbing for notebook
//! kernels. Everything a running cell prints, writes to stderr or asks
//! for on stdin is turned into tagged [`Message`]s on a single
//! [`Stream`], and exactly one kernel at a time is installed as the
//! current execution context so code inside a cell can find it.
//!
//! ```
//! use std::sync::Arc;
//! use kernel_io::messaging::{channel, OutputStream, Stream};
//!
//! let (stream, mut receiver) = channel();
//! let stream: Arc<dyn Stream> = Arc::new(stream);
//! let stdout = OutputStream::stdout(stream);
//! assert_eq!(stdout.write("hi\n").unwrap(), 3);
//! assert_eq!(receiver.try_recv().unwrap().text(), Some("hi\n"));
//! ```

pub mod ast;
pub mod errors;
pub mod messaging;
pub mod runtime;
pub mod testing;
pub mod utilities;

pub use ast::cell::{CellId, CellManager};
pub use errors::{Error, Result};
pub use messaging::{Message, OutputStream, Stdin, StdinMode, Stream, StreamReceiver};
pub use runtime::{
    get_context, initialize_context, teardown_context, ContextGuard, EchoKernel, ExecutionContext,
    ExecutionRequest, Kernel, KernelIo,
};
