//! Shared client-side plumbing for the scenario tests.
#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use chatframe::{
    ChatServer, Envelope, FrameCodec, Kind, ServerConfig,
    store::{MemoryAuthStore, MemoryHistoryStore, MemoryRankStore},
};
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle, time::timeout};
use tokio_util::codec::Framed;

/// Deadline for any single expected message.
pub const RECV_DEADLINE: Duration = Duration::from_secs(2);

/// A server running on an ephemeral port with in-memory stores.
pub struct ServerHarness {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Spawn a server for one test. `config.bind_addr` is overridden with an
/// OS-assigned loopback port.
pub async fn start_server(mut config: ServerConfig) -> ServerHarness {
    config.bind_addr = "127.0.0.1:0".parse().expect("loopback addr");
    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server = ChatServer::new(
        config,
        Arc::new(MemoryAuthStore::new()),
        Arc::new(MemoryHistoryStore::new()),
        Arc::new(MemoryRankStore::new()),
    )
    .with_ready_signal(ready_tx);

    let task = tokio::spawn(async move {
        server
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("server run failed");
    });

    let addr = ready_rx.await.expect("server readiness");
    ServerHarness {
        addr,
        shutdown: Some(shutdown_tx),
        task: Some(task),
    }
}

impl ServerHarness {
    /// Signal shutdown and wait for the server to wind down.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await.expect("server task panicked");
        }
    }
}

/// A framed client connection speaking the chat wire protocol.
pub struct TestClient {
    framed: Framed<TcpStream, FrameCodec>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self {
            framed: Framed::new(stream, FrameCodec::default()),
        }
    }

    pub async fn send(&mut self, envelope: &Envelope) {
        let bytes = envelope.to_bytes().expect("encode envelope");
        self.framed.send(bytes).await.expect("send frame");
    }

    /// Next envelope, failing the test if none arrives within the deadline.
    pub async fn recv(&mut self) -> Envelope {
        let frame = timeout(RECV_DEADLINE, self.framed.next())
            .await
            .expect("timed out waiting for an envelope")
            .expect("connection closed while an envelope was expected")
            .expect("frame decode");
        Envelope::from_bytes(&frame).expect("envelope decode")
    }

    /// Receive envelopes until one of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: Kind) -> Envelope {
        loop {
            let envelope = self.recv().await;
            if envelope.kind == kind {
                return envelope;
            }
        }
    }

    /// Next envelope if one arrives within `window`, `None` otherwise.
    pub async fn try_recv(&mut self, window: Duration) -> Option<Envelope> {
        match timeout(window, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Some(Envelope::from_bytes(&frame).expect("envelope decode")),
            _ => None,
        }
    }

    /// Discard everything that arrives within `window`.
    pub async fn drain(&mut self, window: Duration) {
        while self.try_recv(window).await.is_some() {}
    }

    /// Asserts silence: nothing may arrive within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(next) = timeout(window, self.framed.next()).await {
            panic!("expected silence, got {next:?}");
        }
    }

    /// Asserts the server closes this connection within the deadline.
    pub async fn expect_closed(&mut self) {
        match timeout(RECV_DEADLINE, self.framed.next()).await {
            Ok(None | Some(Err(_))) => {}
            Ok(Some(Ok(frame))) => panic!("expected close, got frame {frame:?}"),
            Err(_) => panic!("connection not closed within deadline"),
        }
    }

    /// Register then join `username`, consuming both OK replies.
    pub async fn login(&mut self, username: &str, password: &str) {
        self.send(&Envelope::new(Kind::Register, username, "", password))
            .await;
        let reply = self.recv().await;
        assert_eq!(reply.content, "OK", "registration should succeed");
        self.join(username, password).await;
    }

    /// Join as an already registered user, consuming the OK reply.
    pub async fn join(&mut self, username: &str, password: &str) {
        self.send(&Envelope::new(Kind::Join, username, "", password))
            .await;
        let reply = self.recv().await;
        assert_eq!(reply.content, "OK", "login should succeed");
    }
}

/// Configuration with liveness generous enough to stay out of the way.
pub fn quiet_config() -> ServerConfig {
    ServerConfig {
        liveness_window: Duration::from_secs(30),
        heartbeat_period: Duration::from_secs(60),
        heartbeat_timeout: Duration::from_secs(60),
        ..ServerConfig::default()
    }
}
