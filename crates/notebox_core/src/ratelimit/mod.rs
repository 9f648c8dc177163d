//! Request rate limiting backed by persisted counters.
//!
//! # Responsibility
//! - Decide whether one more request from a client fits in its budget.
//! - Keep counter state in SQLite so restarts and sibling processes sharing
//!   the database file see the same counts.
//!
//! # Invariants
//! - Windows are fixed, aligned to the Unix epoch, `window` long.
//! - A request is denied once the post-increment count exceeds `max_requests`.
//! - Denied requests still count; hammering does not open the gate early.

use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

mod fixed_window;

pub use fixed_window::FixedWindowLimiter;

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

const GLOBAL_CLIENT_KEY: &str = "global";
const UNKNOWN_CLIENT_KEY: &str = "ip:unknown";

/// Threshold and window length for the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// How requests are grouped into counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// One counter per peer IP address.
    #[default]
    PerIp,
    /// One counter shared by every client.
    Global,
}

impl KeyStrategy {
    /// Derives the counter key for a request from peer `ip`.
    ///
    /// Requests without a known peer share one `ip:unknown` bucket.
    pub fn client_key(self, ip: Option<IpAddr>) -> String {
        match (self, ip) {
            (Self::Global, _) => GLOBAL_CLIENT_KEY.to_string(),
            (Self::PerIp, Some(ip)) => format!("ip:{ip}"),
            (Self::PerIp, None) => UNKNOWN_CLIENT_KEY.to_string(),
        }
    }
}

impl Display for KeyStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerIp => write!(f, "per-ip"),
            Self::Global => write!(f, "global"),
        }
    }
}

impl FromStr for KeyStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-ip" | "ip" => Ok(Self::PerIp),
            "global" => Ok(Self::Global),
            other => Err(format!(
                "unsupported rate limit key `{other}`; expected per-ip|global"
            )),
        }
    }
}

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        limit: u32,
        /// Requests left in the current window after this one.
        remaining: u32,
        /// Time until the current window ends.
        reset_after: Duration,
    },
    Denied {
        limit: u32,
        /// Time until the client may retry.
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::KeyStrategy;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn per_ip_keys_distinguish_clients() {
        let first = KeyStrategy::PerIp.client_key(Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        let second = KeyStrategy::PerIp.client_key(Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
        assert_eq!(first, "ip:10.0.0.1");
        assert_ne!(first, second);
        assert_eq!(KeyStrategy::PerIp.client_key(None), "ip:unknown");
    }

    #[test]
    fn global_key_ignores_peer() {
        let key = KeyStrategy::Global.client_key(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert_eq!(key, "global");
    }

    #[test]
    fn key_strategy_parses_and_displays() {
        assert_eq!("PER-IP".parse::<KeyStrategy>().unwrap(), KeyStrategy::PerIp);
        assert_eq!(" global ".parse::<KeyStrategy>().unwrap(), KeyStrategy::Global);
        assert!("token-bucket".parse::<KeyStrategy>().is_err());
        assert_eq!(KeyStrategy::Global.to_string(), "global");
    }
}
