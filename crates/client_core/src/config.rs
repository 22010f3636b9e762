use std::time::Duration;

/// Tunables for the connection lifecycle.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub max_reconnect_attempts: u32,
    pub base_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            base_reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_millis(30_000),
            heartbeat_interval: Duration::from_millis(30_000),
        }
    }
}
