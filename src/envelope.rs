//! Tagged message envelope carried inside each frame.
//!
//! An [`Envelope`] is the one wire value the room speaks: a [`Kind`] tag
//! plus sender, receiver and text content, serialised as JSON inside a
//! length-prefixed frame. The live connection handle is paired with an
//! envelope at dispatch time and is never part of the wire form.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, ProtocolError};

/// Sender name used for notices originated by the server itself.
pub const SYSTEM_SENDER: &str = "server";

/// Message kinds understood by the room.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Authenticate an existing user.
    Join,
    /// Create a new user account.
    Register,
    /// Graceful departure from the room.
    Leave,
    /// Broadcast chat line.
    Chat,
    /// Directed message; `receiver` names the target.
    Private,
    /// Request the online-user snapshot.
    ListRequest,
    /// Liveness signal.
    Heartbeat,
    /// Request the activity ranking.
    RankRequest,
}

/// One wire message.
///
/// `receiver` is empty for everything except [`Kind::Private`]; it defaults
/// to empty when absent on decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: Kind,
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
    pub content: String,
}

impl Envelope {
    /// Construct an envelope from its parts.
    #[must_use]
    pub fn new(
        kind: Kind,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
        }
    }

    /// Broadcast chat line from `sender`.
    #[must_use]
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Kind::Chat, sender, "", content)
    }

    /// Directed message from `sender` to `receiver`.
    #[must_use]
    pub fn private(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(Kind::Private, sender, receiver, content)
    }

    /// Notice originated by the server itself.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Kind::Chat, SYSTEM_SENDER, "", content)
    }

    /// Acknowledgement for a liveness signal.
    #[must_use]
    pub fn heartbeat_ack() -> Self { Self::new(Kind::Heartbeat, SYSTEM_SENDER, "", "") }

    /// Serialise to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Protocol`] if the value cannot be serialised.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let buf = serde_json::to_vec(self).map_err(ProtocolError::MalformedEnvelope)?;
        Ok(Bytes::from(buf))
    }

    /// Decode from the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Protocol`] for malformed JSON or an unknown
    /// kind; unknown kinds fail decoding rather than coercing to a default.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes).map_err(ProtocolError::MalformedEnvelope)?)
    }
}
