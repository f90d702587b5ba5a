//! Captured standard streams.
//!
//! [`OutputStream`] stands in for stdout/stderr: each `write` becomes
//! exactly one `stdout` or `stderr` message. [`Stdin`] stands in for
//! standard input: a read sends a `stdin` prompt and waits for the
//! consumer's reply, or, in [`StdinMode::Echo`], returns the prompt
//! itself without touching the stream.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::ops::{Message, STDERR, STDIN, STDOUT};
use super::stream::{Stream, StreamError};

/// Conventional text sink contract.
pub trait TextSink {
    /// Write `text`, returning the number of characters written.
    fn write_text(&self, text: &str) -> Result<usize, StreamError>;
}

/// Conventional text source contract.
pub trait TextSource {
    /// Show `prompt` and return one line of input.
    fn readline(&self, prompt: &str) -> Result<String, StreamError>;
}

/// Shared, ordered log of values passed through a recording wrapper.
#[derive(Debug, Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, value: &str) {
        self.0.lock().push(value.to_string());
    }

    fn snapshot(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Output capture
// ---------------------------------------------------------------------------

/// Which standard stream an [`OutputStream`] captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stdout,
    Stderr,
}

impl OutputKind {
    /// The op kind written for this stream.
    pub fn op(self) -> &'static str {
        match self {
            Self::Stdout => STDOUT,
            Self::Stderr => STDERR,
        }
    }
}

/// Captured stdout or stderr.
///
/// No buffering: one `write` call produces exactly one message. Clones
/// share the underlying stream and, for recording instances, the record.
///
/// The [`io::Write`] adapter holds back a multibyte character split
/// across byte writes until its remaining bytes arrive.
pub struct OutputStream {
    stream: Arc<dyn Stream>,
    kind: OutputKind,
    recorder: Option<Recorder>,
    partial_char: Vec<u8>,
}

impl Clone for OutputStream {
    fn clone(&self) -> Self {
        Self {
            stream: Arc::clone(&self.stream),
            kind: self.kind,
            recorder: self.recorder.clone(),
            partial_char: Vec::new(),
        }
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("kind", &self.kind)
            .field("recording", &self.recorder.is_some())
            .finish()
    }
}

impl OutputStream {
    /// Capture standard output onto `stream`.
    pub fn stdout(stream: Arc<dyn Stream>) -> Self {
        Self::new(stream, OutputKind::Stdout)
    }

    /// Capture error output onto `stream`.
    pub fn stderr(stream: Arc<dyn Stream>) -> Self {
        Self::new(stream, OutputKind::Stderr)
    }

    pub fn new(stream: Arc<dyn Stream>, kind: OutputKind) -> Self {
        Self {
            stream,
            kind,
            recorder: None,
            partial_char: Vec::new(),
        }
    }

    /// Also keep every written text in an ordered local record.
    pub fn recording(mut self) -> Self {
        self.recorder = Some(Recorder::default());
        self
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Everything written so far, or empty if not recording.
    pub fn recorded(&self) -> Vec<String> {
        self.recorder
            .as_ref()
            .map(Recorder::snapshot)
            .unwrap_or_default()
    }

    /// Send `text` as one message and return its character count.
    pub fn write(&self, text: &str) -> Result<usize, StreamError> {
        let message = Message::with_field(self.kind.op(), "text", text);
        self.stream.write(&message.op, message.data)?;
        if let Some(recorder) = &self.recorder {
            recorder.push(text);
        }
        Ok(text.chars().count())
    }
}

impl TextSink for OutputStream {
    fn write_text(&self, text: &str) -> Result<usize, StreamError> {
        self.write(text)
    }
}

impl io::Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = std::mem::take(&mut self.partial_char);
        bytes.extend_from_slice(buf);

        let complete = match std::str::from_utf8(&bytes) {
            Ok(_) => bytes.len(),
            // at most 3 bytes of an unfinished character at the end
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };
        let tail = bytes.split_off(complete);
        if !bytes.is_empty() {
            let text = String::from_utf8(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            OutputStream::write(self, &text)
                .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
        }
        self.partial_char = tail;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Input prompt
// ---------------------------------------------------------------------------

/// How a [`Stdin`] answers reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdinMode {
    /// Send a prompt and wait for the consumer's reply.
    #[default]
    Interactive,
    /// Return the prompt immediately; nothing is sent.
    Echo,
}

/// Captured standard input.
#[derive(Clone)]
pub struct Stdin {
    stream: Arc<dyn Stream>,
    mode: StdinMode,
    recorder: Recorder,
}

impl fmt::Debug for Stdin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stdin").field("mode", &self.mode).finish()
    }
}

impl Stdin {
    pub fn new(stream: Arc<dyn Stream>, mode: StdinMode) -> Self {
        Self {
            stream,
            mode,
            recorder: Recorder::default(),
        }
    }

    /// Interactive stdin that blocks until the consumer replies.
    pub fn interactive(stream: Arc<dyn Stream>) -> Self {
        Self::new(stream, StdinMode::Interactive)
    }

    /// Deterministic stdin that echoes each prompt back.
    pub fn echo(stream: Arc<dyn Stream>) -> Self {
        Self::new(stream, StdinMode::Echo)
    }

    pub fn mode(&self) -> StdinMode {
        self.mode
    }

    /// Values returned by reads so far, in order.
    pub fn recorded(&self) -> Vec<String> {
        self.recorder.snapshot()
    }

    /// Read one line of input after showing `prompt`.
    ///
    /// Interactive reads fail with [`StreamError::ChannelClosed`] if the
    /// prompt cannot be sent and [`StreamError::Interrupted`] if the
    /// stream closes while waiting.
    pub fn readline(&self, prompt: &str) -> Result<String, StreamError> {
        let line = match self.mode {
            StdinMode::Echo => prompt.to_string(),
            StdinMode::Interactive => {
                let message = Message::with_field(STDIN, "prompt", prompt);
                self.stream.write(&message.op, message.data)?;
                self.stream.read_reply()?
            }
        };
        self.recorder.push(&line);
        Ok(line)
    }
}

impl TextSource for Stdin {
    fn readline(&self, prompt: &str) -> Result<String, StreamError> {
        Stdin::readline(self, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::stream::channel;
    use crate::testing::MockStream;
    use std::io::Write;
    use std::thread;

    #[test]
    fn test_write_returns_char_count_and_sends_one_message() {
        let mock = Arc::new(MockStream::new());
        let stdout = OutputStream::stdout(mock.clone());

        assert_eq!(stdout.write("héllo").unwrap(), 5);
        assert_eq!(stdout.write("").unwrap(), 0);

        let messages = mock.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::with_field("stdout", "text", "héllo"));
        assert_eq!(messages[1].text(), Some(""));
    }

    #[test]
    fn test_stderr_uses_stderr_op() {
        let mock = Arc::new(MockStream::new());
        let stderr = OutputStream::stderr(mock.clone());
        stderr.write("bad\n").unwrap();
        assert_eq!(mock.messages(), vec![Message::with_field("stderr", "text", "bad\n")]);
    }

    #[test]
    fn test_recording_keeps_channel_behavior() {
        let mock = Arc::new(MockStream::new());
        let stdout = OutputStream::stdout(mock.clone()).recording();
        let clone = stdout.clone();

        stdout.write("1\n").unwrap();
        clone.write("2\n").unwrap();

        assert_eq!(stdout.recorded(), vec!["1\n", "2\n"]);
        assert_eq!(mock.messages().len(), 2);
    }

    #[test]
    fn test_write_on_closed_stream_propagates() {
        let mock = Arc::new(MockStream::new());
        let stdout = OutputStream::stdout(mock.clone()).recording();
        mock.close();
        assert_eq!(stdout.write("lost"), Err(StreamError::ChannelClosed));
        assert!(stdout.recorded().is_empty());
    }

    #[test]
    fn test_io_write_adapter() {
        let mock = Arc::new(MockStream::new());
        let mut stdout = OutputStream::stdout(mock.clone());
        write!(stdout, "x={}", 3).unwrap();
        let joined: String = mock
            .messages()
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect();
        assert_eq!(joined, "x=3");
    }

    #[test]
    fn test_io_write_joins_split_multibyte_char() {
        let mock = Arc::new(MockStream::new());
        let mut stdout = OutputStream::stdout(mock.clone());
        let bytes = "é!".as_bytes();

        assert_eq!(io::Write::write(&mut stdout, &bytes[..1]).unwrap(), 1);
        assert!(mock.messages().is_empty());
        assert_eq!(io::Write::write(&mut stdout, &bytes[1..]).unwrap(), 2);

        assert_eq!(mock.messages(), vec![Message::with_field("stdout", "text", "é!")]);
    }

    #[test]
    fn test_io_write_rejects_invalid_utf8() {
        let mock = Arc::new(MockStream::new());
        let mut stdout = OutputStream::stdout(mock.clone());
        let err = io::Write::write(&mut stdout, &[b'a', 0xff, b'b']).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(mock.messages().is_empty());
    }

    #[test]
    fn test_echo_stdin_returns_prompt_without_messages() {
        let mock = Arc::new(MockStream::new());
        let stdin = Stdin::echo(mock.clone());
        for prompt in ["", "name? ", "multi\nline"] {
            assert_eq!(stdin.readline(prompt).unwrap(), prompt);
        }
        assert!(mock.messages().is_empty());
        assert_eq!(stdin.recorded(), vec!["", "name? ", "multi\nline"]);
    }

    #[test]
    fn test_interactive_stdin_round_trip() {
        let (stream, mut rx) = channel();
        let stdin = Stdin::interactive(Arc::new(stream));
        let reader = thread::spawn(move || stdin.readline("age? "));

        let prompt = rx.recv_blocking().unwrap();
        assert_eq!(prompt.op, "stdin");
        assert_eq!(prompt.prompt(), Some("age? "));
        rx.reply("7").unwrap();

        assert_eq!(reader.join().unwrap(), Ok("7".to_string()));
    }

    #[test]
    fn test_interactive_stdin_interrupted_on_close() {
        let (stream, mut rx) = channel();
        let stdin = Stdin::interactive(Arc::new(stream));
        let reader = thread::spawn(move || stdin.readline("? "));

        rx.recv_blocking().unwrap();
        rx.close();

        assert_eq!(reader.join().unwrap(), Err(StreamError::Interrupted));
    }

    #[test]
    fn test_interactive_stdin_uses_scripted_mock_replies() {
        let mock = Arc::new(MockStream::with_replies(["blue"]));
        let stdin = Stdin::interactive(mock.clone());
        assert_eq!(stdin.readline("color? ").unwrap(), "blue");
        assert_eq!(stdin.readline("again? "), Err(StreamError::Interrupted));
        assert_eq!(mock.messages().len(), 2);
    }

    #[test]
    fn test_both_modes_share_text_source_contract() {
        fn ask(source: &dyn TextSource) -> Result<String, StreamError> {
            source.readline("q")
        }
        let mock = Arc::new(MockStream::with_replies(["a"]));
        assert_eq!(ask(&Stdin::echo(mock.clone())).unwrap(), "q");
        assert_eq!(ask(&Stdin::interactive(mock)).unwrap(), "a");
    }
}
