//! Server runtime: listener, accept loop and task supervision.
//!
//! The runtime binds a TCP listener, spawns the heartbeat monitor, and
//! accepts connections in a loop, spawning one tracked handler task per
//! connection. Accept failures are retried with exponential back-off and
//! never surface as errors. Shutdown cancels the accept loop, closes
//! every live session, and awaits all tracked tasks.

use std::{io, net::SocketAddr, sync::Arc};

use futures::Future;
use log::warn;
use thiserror::Error;
use tokio::{net::TcpListener, select, signal, sync::oneshot, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

use crate::{
    config::{BackoffConfig, ServerConfig},
    handler::ConnectionHandler,
    monitor::HeartbeatMonitor,
    router::Router,
    session::SessionRegistry,
    store::{AuthStore, HistoryStore, RankStore},
};

/// Failure bringing up the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound or inspected.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),
}

/// A chat room server assembled from its configuration and collaborators.
pub struct ChatServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    handler: Arc<ConnectionHandler>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
}

impl ChatServer {
    /// Assemble a server. The registry and router are constructed here and
    /// owned by the runtime; nothing is process-global.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn AuthStore>,
        history: Arc<dyn HistoryStore>,
        rank: Arc<dyn RankStore>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(Router::new(
            Arc::clone(&registry),
            Arc::clone(&history),
            rank,
        ));
        let handler = Arc::new(ConnectionHandler::new(
            Arc::clone(&registry),
            Arc::clone(&router),
            auth,
            history,
            Arc::clone(&config),
        ));
        Self {
            config,
            registry,
            router,
            handler,
            ready_tx: None,
        }
    }

    /// Publish the bound address once the listener is ready.
    ///
    /// Useful with an OS-assigned port (`:0`), for example in tests.
    #[must_use]
    pub fn with_ready_signal(mut self, tx: oneshot::Sender<SocketAddr>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Run the server until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be bound.
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors.
    pub async fn run_with_shutdown<S>(mut self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;
        info!(addr = %local_addr, "chat room listening");

        if let Some(tx) = self.ready_tx.take()
            && tx.send(local_addr).is_err()
        {
            warn!("failed to send readiness signal: receiver dropped");
        }

        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let monitor = HeartbeatMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.router),
            Arc::clone(&self.config),
        );
        tracker.spawn(monitor.run(token.clone()));

        select! {
            () = shutdown => {}
            () = accept_loop(&listener, &self.handler, &tracker, &token, self.config.backoff) => {}
        }
        // Every connection token is a child of this one, so cancelling it
        // closes live sessions and unauthenticated connections alike.
        token.cancel();

        tracker.close();
        tracker.wait().await;
        info!("chat room stopped");
        Ok(())
    }
}

/// Accept connections until `token` fires, backing off on accept errors.
async fn accept_loop(
    listener: &TcpListener,
    handler: &Arc<ConnectionHandler>,
    tracker: &TaskTracker,
    token: &CancellationToken,
    backoff: BackoffConfig,
) {
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    loop {
        let accepted = select! {
            biased;
            () = token.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                let handler = Arc::clone(handler);
                let cancel = token.child_token();
                tracker.spawn(async move { handler.run(stream, peer, cancel).await });
                delay = backoff.initial_delay;
            }
            Err(error) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={error:?}, local_addr={local_addr:?}");
                sleep(delay).await;
                delay = (delay * 2).min(backoff.max_delay);
            }
        }
    }
}
