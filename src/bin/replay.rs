//! Replay notebook cells through an `EchoKernel`.
//!
//! Reads a JSON array of cell sources, runs them as one batch inside an
//! execution context, and prints every op the kernel sends as one JSON
//! line on stdout. In interactive mode, prompts are answered from this
//! process's stdin.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` — Tracing filter (default: "info,kernel_io=debug")
//! - `KERNEL_IO_STDIN_MODE` — "interactive" (default) or "echo"
//! - `KERNEL_IO_RECORD_OUTPUT` — keep a local record of captured output
//!
//! # Usage
//!
//! ```bash
//! echo '["print(1)", "print(input(\"name? \"))"]' > cells.json
//! cargo run --bin kernel-io-replay -- cells.json
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use kernel_io::messaging::ops::STDIN;
use kernel_io::messaging::{channel, Stream, StreamReceiver};
use kernel_io::runtime::{AppMetadata, ContextGuard, EchoKernel, ExecutionRequest, Kernel, KernelIo};
use kernel_io::utilities::SessionConfig;
use kernel_io::CellManager;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,kernel_io=debug".into()),
        )
        .with_writer(io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: kernel-io-replay <cells.json>")?;
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let sources: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of strings", path.display()))?;

    let config = SessionConfig::from_env();
    tracing::info!(
        "Replaying {} cell(s) from {} (stdin: {:?})",
        sources.len(),
        path.display(),
        config.stdin_mode
    );

    let mut cells = CellManager::new();
    let mut requests = Vec::with_capacity(sources.len());
    for code in &sources {
        requests.push(ExecutionRequest::new(cells.create_cell_id()?, code));
    }

    let (stream, receiver) = channel();
    let stream: Arc<dyn Stream> = Arc::new(stream);
    let io = KernelIo::new(Arc::clone(&stream), &config, AppMetadata::new(path.clone()));
    let kernel = Arc::new(EchoKernel::new(io));

    let consumer = thread::spawn(move || consume(receiver));

    let outcome = {
        let _context = ContextGuard::install(kernel.clone(), stream)?;
        kernel.run(&requests)
    };

    let printed = consumer
        .join()
        .map_err(|_| anyhow!("consumer thread panicked"))??;
    outcome?;

    tracing::info!("Replay finished: {} op(s) emitted", printed);
    Ok(())
}

/// Print ops until the stream closes, answering prompts from stdin.
fn consume(mut receiver: StreamReceiver) -> Result<usize> {
    let mut out = io::stdout().lock();
    let mut printed = 0;

    while let Some(message) = receiver.recv_blocking() {
        serde_json::to_writer(&mut out, &message)?;
        writeln!(out)?;
        printed += 1;

        if message.op == STDIN {
            out.flush()?;
            let mut line = String::new();
            if io::stdin().read_line(&mut line)? == 0 {
                tracing::warn!("stdin closed while a prompt was pending");
                receiver.close();
                continue;
            }
            if let Err(e) = receiver.reply(line.trim_end_matches(['\r', '\n'])) {
                tracing::warn!("Could not deliver reply: {}", e);
            }
        }
    }

    out.flush()?;
    Ok(printed)
}
