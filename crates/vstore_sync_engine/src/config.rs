//! Configuration for the sync client.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use vstore_core::ValueId;
use vstore_sync_protocol::{FrameEncoding, DEFAULT_MAX_FRAME_SIZE};

/// Default TCP port of the authority.
pub const DEFAULT_PORT: u16 = 7400;

/// Where the authority listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Stream socket.
    Tcp(SocketAddr),
    /// Local-domain socket.
    Unix(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Configuration of one microservice client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// This microservice's name; its key under shared roots.
    pub app_name: String,
    /// Authority endpoint.
    pub endpoint: Endpoint,
    /// Reconnect and resync after a lost connection.
    pub auto_reconnect: bool,
    /// Shared namespace roots installed as ancestor filters.
    pub shared_roots: Vec<ValueId>,
    /// Reconnect backoff.
    pub retry: RetryConfig,
    /// Frame layout used for outbound messages.
    pub frame_encoding: FrameEncoding,
    /// Largest accepted inbound frame payload.
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Creates a configuration with default settings.
    pub fn new(app_name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            app_name: app_name.into(),
            endpoint,
            auto_reconnect: true,
            shared_roots: default_shared_roots(),
            retry: RetryConfig::default(),
            frame_encoding: FrameEncoding::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Enables or disables reconnect and resync.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Replaces the shared namespace roots.
    pub fn with_shared_roots(mut self, roots: Vec<ValueId>) -> Self {
        self.shared_roots = roots;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the outbound frame layout.
    pub fn with_frame_encoding(mut self, encoding: FrameEncoding) -> Self {
        self.frame_encoding = encoding;
        self
    }

    /// Sets the inbound frame size limit.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(
            "vstore",
            Endpoint::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))),
        )
    }
}

fn default_shared_roots() -> Vec<ValueId> {
    ["logger", "dmo"]
        .into_iter()
        .filter_map(|root| ValueId::parse(root).ok())
        .collect()
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of armed retries between two successful connects
    /// (`None` = unlimited).
    pub retry_max: Option<u32>,
    /// First delay after a disconnect.
    pub initial_delay: Duration,
    /// A doubled delay at or above this threshold wraps back to the initial
    /// delay.
    pub wrap_threshold: Duration,
}

impl RetryConfig {
    /// Creates an unlimited configuration with the default delays.
    pub fn new() -> Self {
        Self {
            retry_max: None,
            initial_delay: Duration::from_millis(250),
            wrap_threshold: Duration::from_millis(8000),
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self::new().with_retry_max(0)
    }

    /// Limits the number of retries.
    pub fn with_retry_max(mut self, max: u32) -> Self {
        self.retry_max = Some(max);
        self
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the wrap threshold.
    pub fn with_wrap_threshold(mut self, threshold: Duration) -> Self {
        self.wrap_threshold = threshold;
        self
    }

    /// Returns true if `attempts` retries exhaust the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.retry_max.is_some_and(|max| attempts >= max)
    }

    /// Computes the delay that follows `previous` (zero after a connect).
    pub fn delay_after(&self, previous: Duration) -> Duration {
        if previous.is_zero() {
            return self.initial_delay;
        }
        let next = previous.saturating_mul(2);
        if next >= self.wrap_threshold {
            self.initial_delay
        } else {
            next
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}
