//! Per-connection state machine: handshake, dispatch loop, cleanup.
//!
//! Each accepted connection runs one handler task. The handler starts
//! unauthenticated and accepts only `Register` and `Join`; a successful
//! join inserts a session into the registry and moves the loop into the
//! authenticated phase, where every decoded envelope is dispatched to the
//! router in read order. Whatever ends the loop — a read error, an
//! explicit leave, the liveness deadline or the monitor closing the
//! session — funnels into the router's one-shot departure sequence, so a
//! failure on one connection never reaches beyond its own cleanup.

use std::{net::SocketAddr, sync::Arc};

use futures::StreamExt;
use tokio::{
    net::{TcpStream, tcp::OwnedReadHalf},
    time::timeout,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::{debug, info, warn};

use crate::{
    codec::{CloseReason, CodecError, FrameCodec},
    config::ServerConfig,
    envelope::{Envelope, Kind, SYSTEM_SENDER},
    push::{self, PushHandle},
    router::{Dispatch, Router},
    session::{Session, SessionRegistry},
    store::{AuthError, AuthStore, HistoryStore},
};

type Reader = FramedRead<OwnedReadHalf, FrameCodec>;

/// Handles a single client connection through its whole lifecycle.
pub struct ConnectionHandler {
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    auth: Arc<dyn AuthStore>,
    history: Arc<dyn HistoryStore>,
    config: Arc<ServerConfig>,
}

impl ConnectionHandler {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
        auth: Arc<dyn AuthStore>,
        history: Arc<dyn HistoryStore>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            registry,
            router,
            auth,
            history,
            config,
        }
    }

    /// Drive `stream` through handshake, dispatch and cleanup.
    ///
    /// `cancel` is the connection's cancellation token; the runtime hands
    /// each connection a child of the server token, so shutdown reaches
    /// connections that never completed the handshake.
    pub async fn run(&self, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let codec = FrameCodec::new(self.config.max_frame_length);
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, codec.clone());
        let sink = FramedWrite::new(write_half, codec);
        let (handle, writer) =
            push::spawn_writer(sink, cancel.clone(), self.config.outbound_capacity);

        debug!(%peer, "connection accepted");
        if let Some(session) = self.authenticate(&mut reader, &handle, &cancel, peer).await {
            self.run_authenticated(&mut reader, &session).await;
            self.router.depart(&session).await;
        }
        cancel.cancel();
        drop(handle);
        if let Err(error) = writer.await {
            debug!(%peer, %error, "writer task join failed");
        }
        debug!(%peer, "connection finished");
    }

    /// Unauthenticated phase: loop until a successful `Join` builds a
    /// session, or the connection dies.
    async fn authenticate(
        &self,
        reader: &mut Reader,
        handle: &PushHandle,
        cancel: &CancellationToken,
        peer: SocketAddr,
    ) -> Option<Arc<Session>> {
        loop {
            let envelope = tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                next = reader.next() => match next {
                    Some(Ok(bytes)) => match Envelope::from_bytes(&bytes) {
                        Ok(envelope) => envelope,
                        Err(error) => {
                            warn!(%peer, %error, "dropping connection on malformed handshake");
                            return None;
                        }
                    },
                    Some(Err(error)) => {
                        log_read_error(&error, &peer.to_string());
                        return None;
                    }
                    None => {
                        debug!(%peer, reason = %CloseReason::Clean, "client left before login");
                        return None;
                    }
                },
            };
            match envelope.kind {
                Kind::Register => self.register(handle, &envelope).await,
                Kind::Join => {
                    if let Some(session) = self.join(handle, cancel, &envelope, peer).await {
                        return Some(session);
                    }
                }
                other => debug!(%peer, kind = ?other, "ignoring pre-login envelope"),
            }
        }
    }

    async fn register(&self, handle: &PushHandle, envelope: &Envelope) {
        // Credentials travel as (sender, content) = (username, password).
        let reply = match self.auth.add_user(&envelope.sender, &envelope.content).await {
            Ok(()) => {
                info!(user = %envelope.sender, "user registered");
                "OK".to_owned()
            }
            Err(error @ AuthError::DuplicateUser(_)) => error.to_string(),
            Err(error) => {
                warn!(user = %envelope.sender, %error, "registration failed");
                "registration failed, try again later".to_owned()
            }
        };
        send_reply(handle, Envelope::new(Kind::Register, SYSTEM_SENDER, "", reply)).await;
    }

    async fn join(
        &self,
        handle: &PushHandle,
        cancel: &CancellationToken,
        envelope: &Envelope,
        peer: SocketAddr,
    ) -> Option<Arc<Session>> {
        let username = envelope.sender.as_str();
        if let Err(error) = self.auth.verify_user(username, &envelope.content).await {
            debug!(%peer, user = username, %error, "login rejected");
            send_reply(
                handle,
                Envelope::new(Kind::Join, SYSTEM_SENDER, "", error.to_string()),
            )
            .await;
            return None;
        }

        let session = Arc::new(Session::new(username, handle.clone(), cancel.clone()));
        if self.registry.insert(Arc::clone(&session)).is_err() {
            send_reply(
                handle,
                Envelope::new(
                    Kind::Join,
                    SYSTEM_SENDER,
                    "",
                    format!("{username} is already logged in"),
                ),
            )
            .await;
            return None;
        }

        send_reply(handle, Envelope::new(Kind::Join, SYSTEM_SENDER, "", "OK")).await;
        info!(%peer, user = username, "user joined");
        self.replay_history(handle).await;
        self.router.announce_join(&session).await;
        Some(session)
    }

    /// Send the recent room history as one system envelope.
    async fn replay_history(&self, handle: &PushHandle) {
        let events = match self.history.read_recent(self.config.history_replay).await {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, "history replay unavailable");
                return;
            }
        };
        if events.is_empty() {
            return;
        }
        let lines = events
            .iter()
            .map(|event| format!("{}: {}", event.sender, event.content))
            .collect::<Vec<_>>()
            .join("\n");
        send_reply(handle, Envelope::system(lines)).await;
    }

    /// Authenticated phase: decode frames in order and hand them to the
    /// router until the session ends.
    async fn run_authenticated(&self, reader: &mut Reader, session: &Arc<Session>) {
        loop {
            let next = tokio::select! {
                biased;
                () = session.closed() => {
                    debug!(user = session.username(), "session closed by peer task");
                    return;
                }
                next = timeout(self.config.liveness_window, reader.next()) => next,
            };
            let envelope = match next {
                Err(_elapsed) => {
                    warn!(user = session.username(), "read deadline expired");
                    return;
                }
                Ok(None) => {
                    debug!(
                        user = session.username(),
                        reason = %CloseReason::Clean,
                        "client disconnected"
                    );
                    return;
                }
                Ok(Some(Err(error))) => {
                    log_read_error(&error, session.username());
                    return;
                }
                Ok(Some(Ok(bytes))) => match Envelope::from_bytes(&bytes) {
                    Ok(envelope) => envelope,
                    Err(error) => {
                        warn!(
                            user = session.username(),
                            %error,
                            "closing connection on protocol error"
                        );
                        return;
                    }
                },
            };
            if self.router.dispatch(session, envelope).await == Dispatch::Disconnect {
                return;
            }
        }
    }
}

async fn send_reply(handle: &PushHandle, envelope: Envelope) {
    if let Err(error) = handle.push(envelope).await {
        debug!(%error, "reply not delivered, connection closing");
    }
}

fn log_read_error(error: &CodecError, who: &str) {
    if error.is_clean_close() {
        debug!(%who, %error, "connection closed");
    } else {
        warn!(%who, %error, "connection read failed");
    }
}
