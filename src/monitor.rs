//! Background liveness sweep evicting silent sessions.
//!
//! The monitor runs independently of any connection task. Each sweep
//! collects the sessions whose last heartbeat lags beyond the timeout —
//! under the registry lock — and then, outside the lock, runs the same
//! one-shot departure sequence every other cleanup path uses. Closing the
//! session's handle is how the eviction reaches the connection's read
//! loop. This is the only proactive eviction path; everything else is
//! reactive inside the connection handler.

use std::{sync::Arc, time::Instant};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{config::ServerConfig, router::Router, session::SessionRegistry};

/// Periodic scan over the registry enforcing the heartbeat contract.
pub struct HeartbeatMonitor {
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    config: Arc<ServerConfig>,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            registry,
            router,
            config,
        }
    }

    /// Run sweeps on the configured period until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.heartbeat_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
        debug!("heartbeat monitor stopped");
    }

    /// Evict every session whose heartbeat lags beyond the timeout.
    pub async fn sweep(&self) {
        let stale = self
            .registry
            .stale_sessions(self.config.heartbeat_timeout, Instant::now());
        for session in stale {
            warn!(user = session.username(), "heartbeat timeout, forcing disconnect");
            self.router.depart(&session).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{sync::mpsc, time::sleep};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        envelope::Envelope,
        push::PushHandle,
        session::Session,
        store::{HistoryStore, MemoryHistoryStore, MemoryRankStore, RankStore},
    };

    struct Fixture {
        monitor: HeartbeatMonitor,
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
    }

    fn fixture(heartbeat_timeout: Duration) -> Fixture {
        let config = Arc::new(ServerConfig {
            heartbeat_timeout,
            ..ServerConfig::default()
        });
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(Router::new(
            Arc::clone(&registry),
            Arc::new(MemoryHistoryStore::new()) as Arc<dyn HistoryStore>,
            Arc::new(MemoryRankStore::new()) as Arc<dyn RankStore>,
        ));
        let monitor = HeartbeatMonitor::new(Arc::clone(&registry), Arc::clone(&router), config);
        Fixture {
            monitor,
            registry,
            router,
        }
    }

    fn join(registry: &Arc<SessionRegistry>, name: &str) -> (Arc<Session>, mpsc::Receiver<Envelope>) {
        let (handle, rx) = PushHandle::for_test(16);
        let session = Arc::new(Session::new(name, handle, CancellationToken::new()));
        registry.insert(Arc::clone(&session)).expect("insert session");
        (session, rx)
    }

    #[tokio::test]
    async fn sweep_evicts_stale_sessions_once() {
        let fx = fixture(Duration::from_millis(50));
        let (dave, _dave_rx) = join(&fx.registry, "dave");
        let (observer, mut observer_rx) = join(&fx.registry, "observer");

        sleep(Duration::from_millis(80)).await;
        observer.beat();
        fx.monitor.sweep().await;
        fx.monitor.sweep().await;

        assert!(!fx.registry.contains("dave"));
        let notices: Vec<Envelope> = std::iter::from_fn(|| observer_rx.try_recv().ok()).collect();
        let dave_departures = notices
            .iter()
            .filter(|envelope| envelope.content.contains("dave left the room"))
            .count();
        assert_eq!(dave_departures, 1);

        tokio::time::timeout(Duration::from_millis(10), dave.closed())
            .await
            .expect("evicted session must be closed");
    }

    #[tokio::test]
    async fn sweep_spares_live_sessions() {
        let fx = fixture(Duration::from_secs(60));
        let (_alice, _rx) = join(&fx.registry, "alice");

        fx.monitor.sweep().await;
        assert!(fx.registry.contains("alice"));
    }

    #[tokio::test]
    async fn eviction_racing_a_client_disconnect_fires_one_notice() {
        let fx = fixture(Duration::from_millis(10));
        let (dave, _dave_rx) = join(&fx.registry, "dave");
        let (observer, mut observer_rx) = join(&fx.registry, "observer");

        sleep(Duration::from_millis(30)).await;
        // Keep the observer alive through the sweep.
        observer.beat();
        tokio::join!(fx.monitor.sweep(), fx.router.depart(&dave));

        assert!(!fx.registry.contains("dave"));
        let notices: Vec<Envelope> = std::iter::from_fn(|| observer_rx.try_recv().ok()).collect();
        let dave_departures = notices
            .iter()
            .filter(|envelope| envelope.content.contains("dave left the room"))
            .count();
        assert_eq!(dave_departures, 1);
    }
}
