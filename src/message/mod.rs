//! Control messages posted to the worker by its clients.
//!
//! Messages arrive as JSON objects discriminated by `type`:
//!
//! ```
//! use swcache::message::ControlMessage;
//!
//! let msg = ControlMessage::from_json(r#"{"type":"GET_VERSION"}"#).unwrap();
//! assert_eq!(msg, ControlMessage::GetVersion);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;

/// The closed set of messages the worker understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting generation immediately.
    SkipWaiting,
    /// Ask for the active version tag.
    GetVersion,
}

impl ControlMessage {
    pub fn from_json(text: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Reply sent back on a message's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageReply {
    Version { version: String },
    Ack { ok: bool },
    Error { error: String },
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The sending half of a reply channel.
pub type ReplyPort = oneshot::Sender<MessageReply>;

/// Creates a reply channel.
pub fn reply_channel() -> (ReplyPort, oneshot::Receiver<MessageReply>) {
    oneshot::channel()
}
