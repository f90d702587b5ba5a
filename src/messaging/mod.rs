//! Messaging between a kernel and its consumer.
//!
//! - [`ops`]: the [`Message`] value and op kinds.
//! - [`stream`]: the [`Stream`] contract and the channel-backed stream.
//! - [`streams`]: captured stdout, stderr and stdin.

pub mod ops;
pub mod stream;
pub mod streams;

pub use ops::{Message, Payload};
pub use stream::{channel, ChannelStream, Stream, StreamError, StreamReceiver};
pub use streams::{OutputKind, OutputStream, Stdin, StdinMode, TextSink, TextSource};
