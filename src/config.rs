//! Server configuration.

use std::{net::SocketAddr, time::Duration};

use crate::codec::MAX_FRAME_LENGTH;

/// Configuration for exponential back-off timing in the accept loop.
///
/// Controls retry behaviour when `accept()` calls fail on the server's TCP
/// listener. The back-off starts at `initial_delay` and doubles on each
/// failure, capped at `max_delay`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay used for the first retry after an `accept()` failure.
    pub initial_delay: Duration,
    /// Maximum back-off delay once retries have increased exponentially.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Clamp delays to sane bounds and ensure `initial_delay <= max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use chatframe::config::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::from_millis(1),
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.initial_delay, Duration::from_millis(1));
    /// assert_eq!(normalized.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }
}

/// Tunables for a chat server instance.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,
    /// Maximum frame payload accepted or produced, in bytes.
    pub max_frame_length: usize,
    /// Read deadline for authenticated connections, refreshed on every
    /// frame.
    pub liveness_window: Duration,
    /// Period between heartbeat monitor sweeps.
    pub heartbeat_period: Duration,
    /// Heartbeat silence beyond which a session is evicted.
    pub heartbeat_timeout: Duration,
    /// Number of history events replayed to a fresh login.
    pub history_replay: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_capacity: usize,
    /// Accept-loop retry behaviour.
    pub backoff: BackoffConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 8080).into(),
            max_frame_length: MAX_FRAME_LENGTH,
            liveness_window: Duration::from_secs(30),
            heartbeat_period: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(20),
            history_replay: 10,
            outbound_capacity: 32,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Configuration bound to `addr` with every other field at its default.
    #[must_use]
    pub fn for_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Self::default()
        }
    }
}
