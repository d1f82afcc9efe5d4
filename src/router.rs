//! Message routing for authenticated sessions.
//!
//! The router interprets each envelope's kind and performs broadcast,
//! private delivery, listing, heartbeat bookkeeping or departure. It also
//! owns the one-shot departure sequence shared by every cleanup path.
//! Deliveries are best-effort per recipient; a failed write to one peer is
//! logged and never aborts delivery to the rest.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    envelope::{Envelope, Kind, SYSTEM_SENDER},
    session::{Session, SessionRegistry},
    store::{HistoryStore, RankStore},
};

/// Activity weight added per chat or private message.
const MESSAGE_ACTIVITY_WEIGHT: f64 = 1.0;

/// What the connection loop should do after a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Keep reading from the connection.
    Continue,
    /// The session is finished; stop the read loop.
    Disconnect,
}

/// Interprets authenticated envelopes and drives deliveries.
pub struct Router {
    registry: Arc<SessionRegistry>,
    history: Arc<dyn HistoryStore>,
    rank: Arc<dyn RankStore>,
}

impl Router {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        history: Arc<dyn HistoryStore>,
        rank: Arc<dyn RankStore>,
    ) -> Self {
        Self {
            registry,
            history,
            rank,
        }
    }

    /// Route one envelope from an authenticated session.
    ///
    /// Envelopes from the same connection arrive here in the order they
    /// were read; no ordering across connections is implied.
    pub async fn dispatch(&self, session: &Arc<Session>, envelope: Envelope) -> Dispatch {
        match envelope.kind {
            Kind::Chat => {
                self.handle_chat(session, &envelope).await;
                Dispatch::Continue
            }
            Kind::Private => {
                self.handle_private(session, envelope).await;
                Dispatch::Continue
            }
            Kind::ListRequest => {
                self.handle_list(session).await;
                Dispatch::Continue
            }
            Kind::Heartbeat => {
                self.handle_heartbeat(session).await;
                Dispatch::Continue
            }
            Kind::RankRequest => {
                self.handle_rank(session).await;
                Dispatch::Continue
            }
            Kind::Leave => {
                self.depart(session).await;
                Dispatch::Disconnect
            }
            Kind::Join | Kind::Register => {
                // Repeated handshake after authentication: non-fatal.
                debug!(
                    user = session.username(),
                    kind = ?envelope.kind,
                    "ignoring repeated handshake"
                );
                self.notify(session, "already logged in").await;
                Dispatch::Continue
            }
        }
    }

    /// Run the one-shot departure sequence for `session`.
    ///
    /// Safe to call from any cleanup path; only the first caller per
    /// session removes it, closes the handle and announces the departure.
    pub async fn depart(&self, session: &Arc<Session>) {
        if !self.registry.remove_if_current(session) {
            return;
        }
        let username = session.username();
        session.close();
        info!(user = username, "session closed");

        let notice = format!("{username} left the room");
        if let Err(error) = self.history.append_event(SYSTEM_SENDER, &notice, "").await {
            warn!(%error, "failed to persist departure event");
        }
        self.broadcast_from(username, Envelope::system(&notice)).await;
    }

    /// Announce a new arrival to the rest of the room.
    pub async fn announce_join(&self, session: &Arc<Session>) {
        let username = session.username();
        let notice = format!("{username} joined the room");
        if let Err(error) = self.history.append_event(SYSTEM_SENDER, &notice, "").await {
            warn!(%error, "failed to persist join event");
        }
        self.broadcast_from(username, Envelope::system(&notice)).await;
    }

    async fn handle_chat(&self, session: &Arc<Session>, envelope: &Envelope) {
        let sender = session.username();
        if let Err(error) = self.history.append_event(sender, &envelope.content, "").await {
            warn!(%error, "failed to persist chat event");
        }
        self.bump_activity(sender).await;
        self.broadcast_from(sender, Envelope::chat(sender, &envelope.content)).await;
    }

    async fn handle_private(&self, session: &Arc<Session>, envelope: Envelope) {
        let sender = session.username();
        let Some(target) = self.registry.lookup(&envelope.receiver) else {
            let notice = format!("user {} is offline or does not exist", envelope.receiver);
            self.notify(session, &notice).await;
            return;
        };

        if let Err(error) = self
            .history
            .append_event(sender, &envelope.content, &envelope.receiver)
            .await
        {
            warn!(%error, "failed to persist private event");
        }
        self.bump_activity(sender).await;

        let receiver = envelope.receiver.clone();
        // Forwarded verbatim; only the session's own name is trusted for
        // bookkeeping above.
        if let Err(error) = target.handle().push(envelope).await {
            warn!(recipient = %receiver, %error, "private delivery failed");
        }
    }

    async fn handle_list(&self, session: &Arc<Session>) {
        let names = self.registry.snapshot();
        let listing = format!("online users: {}", names.join(", "));
        self.reply(
            session,
            Envelope::new(Kind::ListRequest, SYSTEM_SENDER, "", listing),
        )
        .await;
    }

    async fn handle_heartbeat(&self, session: &Arc<Session>) {
        session.beat();
        self.reply(session, Envelope::heartbeat_ack()).await;
    }

    async fn handle_rank(&self, session: &Arc<Session>) {
        match self.rank.rank_snapshot().await {
            Ok(entries) => {
                let listing = entries
                    .iter()
                    .enumerate()
                    .map(|(i, (name, score))| format!("{}. {name}  activity={score:.0}", i + 1))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.reply(
                    session,
                    Envelope::new(Kind::RankRequest, SYSTEM_SENDER, "", listing),
                )
                .await;
            }
            Err(error) => {
                warn!(%error, "rank snapshot failed");
                self.notify(session, "activity ranking is unavailable").await;
            }
        }
    }

    /// Best-effort fan-out; the registry lock is released before any write.
    async fn broadcast_from(&self, sender: &str, envelope: Envelope) {
        let recipients = self.registry.recipients_except(sender);
        for (name, handle) in recipients {
            if let Err(error) = handle.push(envelope.clone()).await {
                warn!(recipient = %name, %error, "broadcast delivery failed");
            }
        }
    }

    async fn reply(&self, session: &Arc<Session>, envelope: Envelope) {
        if let Err(error) = session.handle().push(envelope).await {
            debug!(user = session.username(), %error, "reply not delivered, connection closing");
        }
    }

    async fn notify(&self, session: &Arc<Session>, content: &str) {
        self.reply(session, Envelope::system(content)).await;
    }

    async fn bump_activity(&self, username: &str) {
        if let Err(error) = self
            .rank
            .increment_activity(username, MESSAGE_ACTIVITY_WEIGHT)
            .await
        {
            warn!(%error, "failed to record activity");
        }
    }
}
