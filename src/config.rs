//! Configuration surface (§6.3). One struct shared by both endpoints;
//! fields the server never reads (e.g. reconnect backoff) are simply
//! unused there, and vice versa.

use std::time::Duration;

use crate::frame::DEFAULT_MAX_PAYLOAD;

/// Recognized configuration options with the defaults from §6.3's table.
#[derive(Debug, Clone)]
pub struct Config {
    /// Period between client PINGs. Default 30s.
    pub ping_interval: Duration,
    /// Watchdog deadline after each PING. Default 5s.
    pub pong_timeout: Duration,
    /// Base of exponential backoff. Default 1s.
    pub base_reconnect_delay: Duration,
    /// Cap of exponential backoff. Default 30s.
    pub max_reconnect_delay: Duration,
    /// Rejects oversize frames pre-allocation. Default 4 MiB.
    pub max_payload_size: u32,
    /// Server-side concurrency cap per connection. Default 100.
    pub max_concurrent_streams: usize,
    /// Per-stream idle forcible close. Default 5 min.
    pub idle_timeout: Duration,
    /// Sweep period. Default 1 min.
    pub idle_check_interval: Duration,
    /// Server-side origin validation toggle for development. Default false.
    pub insecure_skip_origin_check: bool,
    /// Controls verbose trace output; the hot path avoids per-frame string
    /// formatting when this is false by relying on `log`'s own level
    /// filtering rather than a separate runtime branch.
    pub enable_logging: bool,
    /// Bounded send-queue capacity in front of the writer actor (§4.2).
    pub send_queue_capacity: usize,
    /// Bearer token the client attaches to every new stream's `HEADERS` as
    /// `authorization: Bearer <token>` (§4.5 step 3). `None` omits the
    /// header entirely; unused on the server side.
    pub auth_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(5),
            base_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_concurrent_streams: 100,
            idle_timeout: Duration::from_secs(5 * 60),
            idle_check_interval: Duration::from_secs(60),
            insecure_skip_origin_check: false,
            enable_logging: false,
            send_queue_capacity: 100,
            auth_token: None,
        }
    }
}

impl Config {
    /// `min(cap, base * 2^attempt)` per §4.7.3.
    #[must_use]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let scaled = self
            .base_reconnect_delay
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max_reconnect_delay);
        scaled.min(self.max_reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::default();
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.pong_timeout, Duration::from_secs(5));
        assert_eq!(config.base_reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(30));
        assert_eq!(config.max_payload_size, 4 * 1024 * 1024);
        assert_eq!(config.max_concurrent_streams, 100);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.idle_check_interval, Duration::from_secs(60));
        assert!(!config.insecure_skip_origin_check);
        assert!(!config.enable_logging);
    }

    #[test]
    fn reconnect_backoff_doubles_then_caps() {
        let config = Config::default();
        assert_eq!(config.reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(config.reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(config.reconnect_delay(5), Duration::from_secs(30));
        assert_eq!(config.reconnect_delay(63), Duration::from_secs(30));
    }
}
