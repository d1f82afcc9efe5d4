//! Core engine for a framed TCP chat room.
//!
//! This crate provides the message-routing and connection-lifecycle engine
//! of a text chat room: a length-prefixed frame codec, the tagged message
//! envelope, a concurrent session registry, the per-connection
//! handshake/dispatch state machine, a broadcast/private/list/heartbeat
//! router, and the background liveness monitor, plus the server runtime
//! tying them together. Credential, history and activity storage are
//! consumed through the trait seams in [`store`].

pub mod codec;
pub mod config;
pub mod envelope;
pub mod handler;
pub mod monitor;
pub mod push;
pub mod router;
pub mod server;
pub mod session;
pub mod store;

pub use codec::{CodecError, FrameCodec, MAX_FRAME_LENGTH};
pub use config::{BackoffConfig, ServerConfig};
pub use envelope::{Envelope, Kind, SYSTEM_SENDER};
pub use handler::ConnectionHandler;
pub use monitor::HeartbeatMonitor;
pub use push::{PushError, PushHandle};
pub use router::{Dispatch, Router};
pub use server::{ChatServer, ServerError};
pub use session::{DuplicateUsername, Session, SessionRegistry};
pub use store::{AuthError, AuthStore, HistoryEvent, HistoryStore, RankStore, StoreError};
