use crate::liteclient::hook::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::str::FromStr;
use std::time::Duration;

/// Timeouts, retry budget and reconnection settings of a pool and its sessions.
/// Durations are (de)serialized as milliseconds; missing fields take defaults.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub query_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub handshake_timeout: Duration,
    /// Extra attempts on other sessions after a retryable failure
    pub max_retries: usize,
    pub max_req_per_peer: usize,
    pub reconnect_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub reconnect_delay: Duration,
    /// Keepalive ping period, disabled when absent
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub ping_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            max_retries: 2,
            max_req_per_peer: 100,
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
            ping_interval: None,
        }
    }
}

impl PoolConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.reconnect_attempts,
            delay: self.reconnect_delay,
        }
    }
}

impl FromStr for PoolConfig {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config = PoolConfig::from_str(r#"{"query_timeout": 1500, "ping_interval": 20000}"#)
            .unwrap();

        assert_eq!(config.query_timeout, Duration::from_millis(1500));
        assert_eq!(config.ping_interval, Some(Duration::from_secs(20)));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 2);
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy {
                attempts: 3,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn serializes_milliseconds() {
        let json = serde_json::to_value(PoolConfig::default()).unwrap();
        assert_eq!(json["query_timeout"], 10_000);
        assert_eq!(json["reconnect_delay"], 1_000);
        assert!(json["ping_interval"].is_null());
    }
}
