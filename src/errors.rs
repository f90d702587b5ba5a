//! Crate-level error type.
//!
//! Each module owns a focused error enum; [`Error`] wraps them for
//! callers that drive several modules at once.

use thiserror::Error;

use crate::ast::cell::CellIdError;
use crate::messaging::stream::StreamError;
use crate::runtime::context::ContextError;
use crate::runtime::kernel::KernelError;
use crate::runtime::requests::RequestError;

/// Any error raised by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    CellId(#[from] CellIdError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
