//! Messages sent from the kernel to its consumer.
//!
//! Every side effect a kernel produces (captured output, input prompts,
//! cell status changes) travels as one [`Message`]: an op kind plus a
//! JSON object payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload of a message: string keys to arbitrary JSON values.
pub type Payload = Map<String, Value>;

/// Op kind for text written to the captured standard output.
pub const STDOUT: &str = "stdout";
/// Op kind for text written to the captured error output.
pub const STDERR: &str = "stderr";
/// Op kind for an input prompt awaiting a reply.
pub const STDIN: &str = "stdin";
/// Op kind for a cell status change reported by a kernel.
pub const CELL_OP: &str = "cell-op";
/// Op kind emitted once a kernel has finished a run.
pub const COMPLETED_RUN: &str = "completed-run";

/// A single tagged message.
///
/// Immutable once constructed; ordering between messages on one stream
/// is the order of the calls that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Op kind, e.g. `"stdout"`.
    pub op: String,
    /// Op data.
    pub data: Payload,
}

impl Message {
    /// Create a new message.
    pub fn new(op: impl Into<String>, data: Payload) -> Self {
        Self {
            op: op.into(),
            data,
        }
    }

    /// Build a message whose payload holds a single string field.
    pub fn with_field(op: impl Into<String>, key: &str, value: impl Into<String>) -> Self {
        let mut data = Payload::new();
        data.insert(key.to_string(), Value::String(value.into()));
        Self::new(op, data)
    }

    /// The `"text"` field of a `stdout`/`stderr` message.
    pub fn text(&self) -> Option<&str> {
        self.data.get("text").and_then(Value::as_str)
    }

    /// The `"prompt"` field of a `stdin` message.
    pub fn prompt(&self) -> Option<&str> {
        self.data.get("prompt").and_then(Value::as_str)
    }

    /// Whether this message is captured output (`stdout` or `stderr`).
    pub fn is_output(&self) -> bool {
        self.op == STDOUT || self.op == STDERR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_field_builds_single_key_payload() {
        let msg = Message::with_field(STDOUT, "text", "hi\n");
        assert_eq!(msg.op, "stdout");
        assert_eq!(msg.data.len(), 1);
        assert_eq!(msg.text(), Some("hi\n"));
        assert_eq!(msg.prompt(), None);
        assert!(msg.is_output());
    }

    #[test]
    fn test_prompt_accessor() {
        let msg = Message::with_field(STDIN, "prompt", "name? ");
        assert_eq!(msg.prompt(), Some("name? "));
        assert!(!msg.is_output());
    }

    #[test]
    fn test_serializes_as_op_and_data() {
        let msg = Message::with_field(STDERR, "text", "oops");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["op"], "stderr");
        assert_eq!(json["data"]["text"], "oops");
    }
}
