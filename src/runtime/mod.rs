//! Kernel runtime: requests, the kernel boundary and the execution
//! context.

pub mod context;
pub mod kernel;
pub mod requests;

pub use context::{
    context_is_active, get_context, initialize_context, install_context, teardown_context,
    ContextError, ContextGuard, ExecutionContext,
};
pub use kernel::{EchoKernel, Kernel, KernelError, KernelIo};
pub use requests::{AppMetadata, CellConfig, ExecutionRequest, RequestError};
