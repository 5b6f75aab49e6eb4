//! Configuration for the tracker.

use std::time::Duration;

use tweetwatch_core::RuleLimits;
use tweetwatch_stream::{SessionConfig, SyncConfig};

use crate::pipeline::PipelineConfig;

/// Tracker configuration.
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    /// Rule limits and remote call timeout.
    pub sync: SyncConfig,
    /// Stream session settings.
    pub session: SessionConfig,
    /// Matching pipeline settings.
    pub pipeline: PipelineConfig,
}

impl TrackerConfig {
    /// Default configuration with the given rule limits.
    pub fn with_limits(limits: RuleLimits) -> Self {
        Self {
            sync: SyncConfig {
                limits,
                ..SyncConfig::default()
            },
            ..Self::default()
        }
    }

    /// Use `timeout` for every remote rule call and for opening the stream.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.sync.request_timeout = timeout;
        self.session.open_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_limits_keeps_other_defaults() {
        let config = TrackerConfig::with_limits(RuleLimits::new(2, 64))
            .request_timeout(Duration::from_secs(3));
        assert_eq!(config.sync.limits, RuleLimits::new(2, 64));
        assert_eq!(config.sync.request_timeout, Duration::from_secs(3));
        assert_eq!(config.session.open_timeout, Duration::from_secs(3));
        assert_eq!(config.session.event_buffer, 1000);
    }
}
