//! The kernel boundary.
//!
//! A kernel is constructed from a [`KernelIo`] bundle (stream, captured
//! stdout/stderr/stdin, cell configs, app metadata), accepts
//! [`ExecutionRequest`]s and reports what happens over the same stream.
//! How a real kernel schedules and evaluates cells lives behind the
//! [`Kernel`] trait. [`EchoKernel`] is a minimal line-oriented kernel
//! used by the test harness and the replay binary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::ast::cell::CellId;
use crate::messaging::ops::{Payload, CELL_OP, COMPLETED_RUN};
use crate::messaging::stream::{Stream, StreamError};
use crate::messaging::streams::{OutputStream, Stdin, StdinMode};
use crate::runtime::requests::{AppMetadata, CellConfig, ExecutionRequest};
use crate::utilities::config::{process_config, SessionConfig};

/// Errors surfaced by a kernel run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// The stream failed while a cell was running.
    #[error("Stream failure while running cell {cell_id}: {source}")]
    Stream {
        cell_id: CellId,
        #[source]
        source: StreamError,
    },

    /// The stream failed outside any cell.
    #[error(transparent)]
    Io(#[from] StreamError),
}

/// An execution engine the I/O layer can host.
pub trait Kernel: Send + Sync {
    /// Metadata the kernel was constructed with.
    fn app_metadata(&self) -> &AppMetadata;

    /// Effective configuration of `cell_id`, merged over kernel defaults.
    fn cell_config(&self, cell_id: &CellId) -> CellConfig;

    /// Execute `requests` in order, reporting over the kernel's stream.
    fn run(&self, requests: &[ExecutionRequest]) -> Result<(), KernelError>;
}

/// Everything a kernel is constructed with.
#[derive(Clone)]
pub struct KernelIo {
    pub stream: Arc<dyn Stream>,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub stdin: Stdin,
    pub cell_configs: HashMap<CellId, CellConfig>,
    pub app_metadata: AppMetadata,
}

impl fmt::Debug for KernelIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelIo")
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("stdin", &self.stdin)
            .field("cell_configs", &self.cell_configs)
            .field("app_metadata", &self.app_metadata)
            .finish()
    }
}

impl KernelIo {
    /// Build the captured streams for `stream` according to `config`.
    pub fn new(stream: Arc<dyn Stream>, config: &SessionConfig, app_metadata: AppMetadata) -> Self {
        let mut stdout = OutputStream::stdout(Arc::clone(&stream));
        let mut stderr = OutputStream::stderr(Arc::clone(&stream));
        if config.record_output {
            stdout = stdout.recording();
            stderr = stderr.recording();
        }
        let stdin = Stdin::new(Arc::clone(&stream), config.stdin_mode);
        Self {
            stream,
            stdout,
            stderr,
            stdin,
            cell_configs: HashMap::new(),
            app_metadata,
        }
    }

    /// Builder: set the configuration of one cell.
    pub fn with_cell_config(mut self, cell_id: CellId, config: CellConfig) -> Self {
        self.cell_configs.insert(cell_id, config);
        self
    }

    pub fn stdin_mode(&self) -> StdinMode {
        self.stdin.mode()
    }
}

/// Minimal kernel that understands one statement per line.
///
/// Recognized statements: `print(expr)`, `eprint(expr)` and `input(expr)`,
/// where `expr` is a quoted string, a nested `input(...)`, or bare text.
/// Blank lines and `#` comments are skipped. Anything else is reported
/// on stderr and marks the cell as errored. Cells whose config sets
/// `"disabled": true` are not run.
pub struct EchoKernel {
    io: KernelIo,
    defaults: CellConfig,
    executed: Mutex<Vec<ExecutionRequest>>,
}

impl fmt::Debug for EchoKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoKernel")
            .field("io", &self.io)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl EchoKernel {
    pub fn new(io: KernelIo) -> Self {
        Self {
            io,
            defaults: json!({}),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Builder: kernel-wide cell config defaults.
    pub fn with_defaults(mut self, defaults: CellConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn stream(&self) -> &Arc<dyn Stream> {
        &self.io.stream
    }

    pub fn stdout(&self) -> &OutputStream {
        &self.io.stdout
    }

    pub fn stderr(&self) -> &OutputStream {
        &self.io.stderr
    }

    pub fn stdin(&self) -> &Stdin {
        &self.io.stdin
    }

    /// Requests accepted so far, in submission order.
    pub fn executed(&self) -> Vec<ExecutionRequest> {
        self.executed.lock().clone()
    }

    fn send_op(&self, op: &str, data: Value) -> Result<(), StreamError> {
        let payload: Payload = match data {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        self.io.stream.write(op, payload)
    }

    fn run_cell(&self, request: &ExecutionRequest) -> Result<(), StreamError> {
        let cell_id = request.cell_id().as_str();
        let config = self.cell_config(request.cell_id());
        if config.get("disabled").and_then(Value::as_bool) == Some(true) {
            log::debug!("[EchoKernel] skipping disabled cell {}", cell_id);
            return self.send_op(CELL_OP, json!({"cell_id": cell_id, "status": "disabled"}));
        }

        self.send_op(CELL_OP, json!({"cell_id": cell_id, "status": "running"}))?;
        let mut errored = false;
        for line in request.code().lines() {
            if !self.execute_line(line)? {
                errored = true;
            }
        }
        self.send_op(
            CELL_OP,
            json!({"cell_id": cell_id, "status": "idle", "errored": errored}),
        )
    }

    /// Returns `Ok(false)` when the statement is not understood.
    fn execute_line(&self, line: &str) -> Result<bool, StreamError> {
        let statement = line.trim();
        if statement.is_empty() || statement.starts_with('#') {
            return Ok(true);
        }
        if let Some(expr) = call_argument(statement, "print") {
            let value = self.evaluate(expr)?;
            self.io.stdout.write(&format!("{value}\n"))?;
        } else if let Some(expr) = call_argument(statement, "eprint") {
            let value = self.evaluate(expr)?;
            self.io.stderr.write(&format!("{value}\n"))?;
        } else if statement.starts_with("input(") {
            self.evaluate(statement)?;
        } else {
            self.io
                .stderr
                .write(&format!("unsupported statement: {statement}\n"))?;
            return Ok(false);
        }
        Ok(true)
    }

    fn evaluate(&self, expr: &str) -> Result<String, StreamError> {
        let expr = expr.trim();
        match call_argument(expr, "input") {
            Some(prompt) => {
                let prompt = self.evaluate(prompt)?;
                self.io.stdin.readline(&prompt)
            }
            None => Ok(unquote(expr).to_string()),
        }
    }
}

impl Kernel for EchoKernel {
    fn app_metadata(&self) -> &AppMetadata {
        &self.io.app_metadata
    }

    fn cell_config(&self, cell_id: &CellId) -> CellConfig {
        let config = self.io.cell_configs.get(cell_id).cloned().unwrap_or(Value::Null);
        process_config(&config, &self.defaults)
    }

    fn run(&self, requests: &[ExecutionRequest]) -> Result<(), KernelError> {
        log::debug!("[EchoKernel] running {} cell(s)", requests.len());
        for request in requests {
            self.executed.lock().push(request.clone());
            self.run_cell(request).map_err(|source| KernelError::Stream {
                cell_id: request.cell_id().clone(),
                source,
            })?;
        }
        self.send_op(COMPLETED_RUN, json!({"cells": requests.len()}))?;
        Ok(())
    }
}

/// `name(arg)` -> `arg`.
fn call_argument<'a>(statement: &'a str, name: &str) -> Option<&'a str> {
    statement
        .strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn unquote(expr: &str) -> &str {
    for quote in ['"', '\''] {
        if expr.len() >= 2 && expr.starts_with(quote) && expr.ends_with(quote) {
            return &expr[1..expr.len() - 1];
        }
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::cell::CellManager;
    use crate::messaging::ops::Message;
    use crate::testing::MockStream;

    fn kernel(mock: &Arc<MockStream>, mode: StdinMode) -> EchoKernel {
        let config = SessionConfig {
            stdin_mode: mode,
            record_output: true,
        };
        EchoKernel::new(KernelIo::new(
            mock.clone(),
            &config,
            AppMetadata::new("/app/test.py"),
        ))
    }

    fn texts(messages: &[Message], op: &str) -> Vec<String> {
        messages
            .iter()
            .filter(|m| m.op == op)
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_call_argument_and_unquote() {
        assert_eq!(call_argument("print(1)", "print"), Some("1"));
        assert_eq!(call_argument("print (\"a\")", "print"), Some("\"a\""));
        assert_eq!(call_argument("printer(1)", "print"), None);
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("\"y\""), "y");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("42"), "42");
    }

    #[test]
    fn test_run_reports_ops_in_order() {
        let mock = Arc::new(MockStream::new());
        let k = kernel(&mock, StdinMode::Echo);
        let mut cells = CellManager::new();
        let c1 = cells.create_cell_id().unwrap();
        let req = ExecutionRequest::new(c1, "print(1)\neprint('e')\nprint(2)");

        k.run(&[req.clone()]).unwrap();

        let ops: Vec<String> = mock.messages().iter().map(|m| m.op.clone()).collect();
        assert_eq!(
            ops,
            vec!["cell-op", "stdout", "stderr", "stdout", "cell-op", "completed-run"]
        );
        assert_eq!(k.stdout().recorded(), vec!["1\n", "2\n"]);
        assert_eq!(k.stderr().recorded(), vec!["e\n"]);
        assert_eq!(k.executed(), vec![req]);
    }

    #[test]
    fn test_echo_input_returns_prompt() {
        let mock = Arc::new(MockStream::new());
        let k = kernel(&mock, StdinMode::Echo);
        let req = ExecutionRequest::build("a", "print(input('name? '))").unwrap();
        k.run(&[req]).unwrap();

        let messages = mock.messages();
        assert_eq!(texts(&messages, "stdout"), vec!["name? \n"]);
        assert!(messages.iter().all(|m| m.op != "stdin"));
    }

    #[test]
    fn test_interactive_input_uses_reply() {
        let mock = Arc::new(MockStream::with_replies(["Ada"]));
        let k = kernel(&mock, StdinMode::Interactive);
        let req = ExecutionRequest::build("a", "print(input(\"name? \"))").unwrap();
        k.run(&[req]).unwrap();

        let messages = mock.messages();
        assert!(messages.iter().any(|m| m.prompt() == Some("name? ")));
        assert_eq!(texts(&messages, "stdout"), vec!["Ada\n"]);
    }

    #[test]
    fn test_interrupted_input_surfaces_as_error() {
        let mock = Arc::new(MockStream::new());
        let k = kernel(&mock, StdinMode::Interactive);
        let req = ExecutionRequest::build("a", "input('?')").unwrap();
        let err = k.run(&[req]).unwrap_err();
        assert!(matches!(
            err,
            KernelError::Stream {
                source: StreamError::Interrupted,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_statement_marks_cell_errored() {
        let mock = Arc::new(MockStream::new());
        let k = kernel(&mock, StdinMode::Echo);
        k.run(&[ExecutionRequest::build("a", "x = 1").unwrap()]).unwrap();

        let messages = mock.messages();
        assert_eq!(texts(&messages, "stderr"), vec!["unsupported statement: x = 1\n"]);
        let idle = messages
            .iter()
            .find(|m| m.data.get("status") == Some(&json!("idle")))
            .unwrap();
        assert_eq!(idle.data.get("errored"), Some(&json!(true)));
    }

    #[test]
    fn test_disabled_cell_is_skipped() {
        let mock = Arc::new(MockStream::new());
        let cell = CellId::new("a").unwrap();
        let io = KernelIo::new(mock.clone(), &SessionConfig::default(), AppMetadata::default())
            .with_cell_config(cell.clone(), json!({"disabled": true}));
        let k = EchoKernel::new(io).with_defaults(json!({"disabled": false, "hide_code": true}));

        assert_eq!(k.cell_config(&cell), json!({"disabled": true, "hide_code": true}));
        k.run(&[ExecutionRequest::new(cell, "print(1)")]).unwrap();

        let messages = mock.messages();
        assert!(messages.iter().all(|m| m.op != "stdout"));
        assert_eq!(messages[0].data.get("status"), Some(&json!("disabled")));
    }

    #[test]
    fn test_closed_stream_fails_run() {
        let mock = Arc::new(MockStream::new());
        let k = kernel(&mock, StdinMode::Echo);
        mock.close();
        let err = k.run(&[ExecutionRequest::build("a", "print(1)").unwrap()]).unwrap_err();
        assert!(matches!(
            err,
            KernelError::Stream {
                source: StreamError::ChannelClosed,
                ..
            }
        ));
    }
}
