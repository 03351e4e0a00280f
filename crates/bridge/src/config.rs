use std::time::Duration;

/// Version string published on the readiness marker and the ready event.
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dismissal delay for timed notifications that carry no `duration`.
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(5000);

pub const DEFAULT_MAX_ID_ATTEMPTS: usize = 8;

/// Runtime knobs shared by every component of a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub version: String,
    pub default_notification_duration: Duration,
    /// `None` keeps unanswered requests pending until the host is torn down.
    pub request_timeout: Option<Duration>,
    /// How many fresh ids the shim draws before giving up on a collision.
    pub max_id_attempts: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: BRIDGE_VERSION.to_string(),
            default_notification_duration: DEFAULT_NOTIFICATION_DURATION,
            request_timeout: None,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }
}

impl BridgeConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_notification_duration(mut self, duration: Duration) -> Self {
        self.default_notification_duration = duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_never_time_out_requests() {
        let config = BridgeConfig::default();
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.default_notification_duration, Duration::from_millis(5000));
        assert_eq!(config.version, BRIDGE_VERSION);
    }

    #[test]
    fn builders_override_fields() {
        let config = BridgeConfig::default()
            .with_request_timeout(Duration::from_secs(3))
            .with_notification_duration(Duration::from_millis(750));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.default_notification_duration, Duration::from_millis(750));
    }
}
