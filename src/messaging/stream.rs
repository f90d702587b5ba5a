//! The message stream between a kernel and its consumer.
//!
//! [`Stream`] is the one-way conduit every kernel side effect travels
//! through, plus a reverse path used only to answer input prompts.
//! [`channel`] creates the production pair: a [`ChannelStream`] handed to
//! the kernel and a [`StreamReceiver`] kept by the consumer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use super::ops::{Message, Payload, STDIN};

/// Errors raised by stream operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A write or reply was attempted after the stream was closed.
    #[error("Channel closed")]
    ChannelClosed,

    /// A suspended read was cancelled because the stream was closed.
    #[error("Input interrupted: stream closed while waiting for a reply")]
    Interrupted,

    /// A reply was sent while no prompt was waiting for one.
    #[error("No pending prompt to reply to")]
    NoPendingPrompt,
}

/// Ordered, one-way conduit of tagged messages.
///
/// `write` never blocks and produces exactly one message per call.
/// `read_reply` is the only suspension point: it waits for the consumer
/// to answer a prompt and fails with [`StreamError::Interrupted`] once
/// the stream is closed.
pub trait Stream: Send + Sync {
    /// Append one message to the stream.
    fn write(&self, op: &str, data: Payload) -> Result<(), StreamError>;

    /// Block until the consumer replies to the most recent prompt.
    fn read_reply(&self) -> Result<String, StreamError>;

    /// Close the stream. Idempotent; wakes a suspended reader.
    fn close(&self);

    /// Whether the stream has been closed from either side.
    fn is_closed(&self) -> bool;

    /// Whether a reader is currently suspended in [`read_reply`](Self::read_reply).
    fn awaiting_reply(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct ChannelState {
    messages: VecDeque<Message>,
    replies: VecDeque<String>,
    /// `stdin` ops sent that have not been answered yet.
    unanswered_prompts: usize,
    reader_waiting: bool,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ChannelState>,
    message_ready: Condvar,
    reply_ready: Condvar,
    message_notify: Notify,
}

impl Shared {
    /// Returns `false` if the stream was already closed.
    fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.message_ready.notify_all();
        self.reply_ready.notify_all();
        self.message_notify.notify_waiters();
        self.message_notify.notify_one();
        true
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn reader_waiting(&self) -> bool {
        self.state.lock().reader_waiting
    }
}

/// Create a connected stream / receiver pair.
pub fn channel() -> (ChannelStream, StreamReceiver) {
    let shared = Arc::new(Shared::default());
    (
        ChannelStream {
            shared: Arc::clone(&shared),
        },
        StreamReceiver { shared },
    )
}

/// Kernel side of a [`channel`].
///
/// Blocking waits use plain condition variables, so they are safe on any
/// thread, including one that is driving an async runtime. Dropping the
/// stream closes it.
pub struct ChannelStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("closed", &self.is_closed())
            .field("awaiting_reply", &self.awaiting_reply())
            .finish()
    }
}

impl Stream for ChannelStream {
    fn write(&self, op: &str, data: Payload) -> Result<(), StreamError> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(StreamError::ChannelClosed);
            }
            if op == STDIN {
                state.unanswered_prompts += 1;
            }
            state.messages.push_back(Message::new(op, data));
        }
        self.shared.message_ready.notify_one();
        self.shared.message_notify.notify_one();
        Ok(())
    }

    fn read_reply(&self) -> Result<String, StreamError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StreamError::Interrupted);
        }
        state.reader_waiting = true;
        let reply = loop {
            if let Some(line) = state.replies.pop_front() {
                break Ok(line);
            }
            if state.closed {
                break Err(StreamError::Interrupted);
            }
            self.shared.reply_ready.wait(&mut state);
        };
        state.reader_waiting = false;
        reply
    }

    fn close(&self) {
        if self.shared.close() {
            log::debug!("[ChannelStream] closing stream");
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    fn awaiting_reply(&self) -> bool {
        self.shared.reader_waiting()
    }
}

impl Drop for ChannelStream {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Consumer side of a [`channel`].
///
/// Messages arrive in the order they were written. Messages already
/// buffered stay readable after the stream is closed. Dropping the
/// receiver closes the stream.
pub struct StreamReceiver {
    shared: Arc<Shared>,
}

impl StreamReceiver {
    /// Take the next buffered message without blocking.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.shared.state.lock().messages.pop_front()
    }

    /// Block until the next message arrives, or return `None` once the
    /// stream is closed and drained.
    pub fn recv_blocking(&mut self) -> Option<Message> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(message) = state.messages.pop_front() {
                return Some(message);
            }
            if state.closed {
                return None;
            }
            self.shared.message_ready.wait(&mut state);
        }
    }

    /// Await the next message, or `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let notified = self.shared.message_notify.notified();
            {
                let mut state = self.shared.state.lock();
                if let Some(message) = state.messages.pop_front() {
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take every buffered message, in order.
    pub fn drain(&mut self) -> Vec<Message> {
        self.shared.state.lock().messages.drain(..).collect()
    }

    /// Answer the oldest unanswered `stdin` prompt.
    ///
    /// Fails with [`StreamError::NoPendingPrompt`] if every prompt sent so
    /// far already has a reply, so a stray reply can never answer a
    /// later, unrelated prompt.
    pub fn reply(&self, line: impl Into<String>) -> Result<(), StreamError> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(StreamError::ChannelClosed);
            }
            if state.unanswered_prompts == 0 {
                return Err(StreamError::NoPendingPrompt);
            }
            state.unanswered_prompts -= 1;
            state.replies.push_back(line.into());
        }
        self.shared.reply_ready.notify_one();
        Ok(())
    }

    /// Whether the kernel is suspended waiting for a reply.
    pub fn awaiting_reply(&self) -> bool {
        self.shared.reader_waiting()
    }

    /// Whether the stream has been closed from either side.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Close the stream from the consumer side.
    ///
    /// Further writes fail with [`StreamError::ChannelClosed`]; a reader
    /// suspended on a prompt wakes with [`StreamError::Interrupted`].
    pub fn close(&mut self) {
        if self.shared.close() {
            log::debug!("[StreamReceiver] closing stream");
        }
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.close();
    }
}
