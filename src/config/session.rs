use serde::Deserialize;
use std::time::Duration;

/// Session lifecycle tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Terminate idle sessions after this many seconds with no appended
    /// frame. Default: 30s.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Janitor sweep cadence, in seconds. Default: 5s.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Bounded depth of the completed-session queue. Default: 1024.
    #[serde(default = "default_completion_channel_depth")]
    pub completion_channel_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            completion_channel_depth: default_completion_channel_depth(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub(crate) fn validate(&self) -> crate::error::Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(crate::error::CoreError::Config(
                "session.idle_timeout_secs must be > 0".into(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(crate::error::CoreError::Config(
                "session.cleanup_interval_secs must be > 0".into(),
            ));
        }
        if self.completion_channel_depth == 0 {
            return Err(crate::error::CoreError::Config(
                "session.completion_channel_depth must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    5
}

fn default_completion_channel_depth() -> usize {
    1024
}
