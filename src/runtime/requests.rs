//! Requests accepted by a kernel and the metadata it is built with.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ast::cell::{CellId, CellIdError};
use crate::utilities::string_utils::dedent;

/// Opaque per-cell configuration.
pub type CellConfig = Value;

/// Errors raised while building an [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid execution request: {message}")]
    InvalidExecutionRequest { message: String },
}

impl From<CellIdError> for RequestError {
    fn from(err: CellIdError) -> Self {
        Self::InvalidExecutionRequest {
            message: err.to_string(),
        }
    }
}

/// One cell's code, submitted for execution.
///
/// `code` is stored dedented so requests built from indented source
/// blocks run identically to flush ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRequest {
    cell_id: CellId,
    code: String,
}

impl ExecutionRequest {
    /// Build a request, dedenting `raw_code`.
    pub fn new(cell_id: CellId, raw_code: &str) -> Self {
        Self {
            cell_id,
            code: dedent(raw_code),
        }
    }

    /// Build a request from an unvalidated cell id.
    pub fn build(cell_id: &str, raw_code: &str) -> Result<Self, RequestError> {
        if raw_code.contains('\0') {
            return Err(RequestError::InvalidExecutionRequest {
                message: format!("code for cell {cell_id:?} contains a NUL byte"),
            });
        }
        let cell_id = CellId::new(cell_id)?;
        Ok(Self::new(cell_id, raw_code))
    }

    pub fn cell_id(&self) -> &CellId {
        &self.cell_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Application metadata handed to a kernel at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Path of the notebook file being run.
    pub filename: Option<PathBuf>,
    /// Query parameters the app was opened with.
    #[serde(default)]
    pub query_params: HashMap<String, Value>,
    /// Command-line arguments passed to the app.
    #[serde(default)]
    pub cli_args: HashMap<String, Value>,
}

impl AppMetadata {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::cell::CellManager;

    #[test]
    fn test_request_dedents_code() {
        let mut manager = CellManager::new();
        let c1 = manager.create_cell_id().unwrap();
        let req = ExecutionRequest::new(c1.clone(), "    print(1)\n    print(2)");
        assert_eq!(req.cell_id(), &c1);
        assert_eq!(req.code(), "print(1)\nprint(2)");
    }

    #[test]
    fn test_build_rejects_empty_cell_id() {
        assert!(matches!(
            ExecutionRequest::build("", "x = 1"),
            Err(RequestError::InvalidExecutionRequest { .. })
        ));
    }

    #[test]
    fn test_build_rejects_nul_code() {
        assert!(ExecutionRequest::build("a", "x\0").is_err());
    }

    #[test]
    fn test_build_accepts_valid_input() {
        let req = ExecutionRequest::build("Hbol", "  x = 1").unwrap();
        assert_eq!(req.cell_id().as_str(), "Hbol");
        assert_eq!(req.code(), "x = 1");
    }

    #[test]
    fn test_app_metadata_new() {
        let meta = AppMetadata::new("/app/test.py");
        assert_eq!(meta.filename, Some(PathBuf::from("/app/test.py")));
        assert!(meta.query_params.is_empty());
    }
}
