use serde::Deserialize;

use super::logging::LoggingConfig;
use super::ring::RingBufferConfig;
use super::session::SessionConfig;

/// Top-level configuration for the stream-observation core.
///
/// Every field has a sane default; a caller may load a partial TOML
/// document and get sane values for everything it omits.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Ring buffer sizing and backpressure behaviour.
    #[serde(default)]
    pub ring: RingBufferConfig,
    /// Bounded depth of the per-stream `ProtocolEvent` channel.
    /// Default: 4096
    #[serde(default = "default_event_channel_depth")]
    pub event_channel_depth: usize,
    /// Scratch buffer the scanner copies ring contents into per iteration.
    /// Default: 65,536
    #[serde(default = "default_scan_scratch")]
    pub scan_scratch: usize,
    /// Protocol name to try before auto-detection; skips auto-detect when set.
    /// Default: none
    #[serde(default)]
    pub preferred_protocol: Option<String>,
    /// Session lifecycle tuning (idle timeout, janitor cadence, completion
    /// channel depth).
    #[serde(default)]
    pub session: SessionConfig,
    /// Reject recovered messages larger than this many bytes.
    /// Default: `ring.capacity / 4`
    #[serde(default)]
    pub max_event_size: Option<usize>,
    /// Structured logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring: RingBufferConfig::default(),
            event_channel_depth: default_event_channel_depth(),
            scan_scratch: default_scan_scratch(),
            preferred_protocol: None,
            session: SessionConfig::default(),
            max_event_size: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Resolve `max_event_size`, defaulting to `capacity / 4` when unset.
    pub fn max_event_size(&self) -> usize {
        self.max_event_size.unwrap_or(self.ring.capacity / 4)
    }

    /// Validate cross-field invariants that serde's per-field defaults can't
    /// express on their own. A single pass returning the first violation
    /// found.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.ring.capacity < super::ring::MIN_RING_CAPACITY {
            return Err(crate::error::CoreError::Config(format!(
                "ring.capacity must be >= {}, got {}",
                super::ring::MIN_RING_CAPACITY,
                self.ring.capacity
            )));
        }
        if !(self.ring.high_water_frac > 0.0 && self.ring.high_water_frac <= 1.0) {
            return Err(crate::error::CoreError::Config(format!(
                "ring.high_water_frac must be in (0.0, 1.0], got {}",
                self.ring.high_water_frac
            )));
        }
        if self.event_channel_depth == 0 {
            return Err(crate::error::CoreError::Config(
                "event_channel_depth must be > 0".into(),
            ));
        }
        if self.scan_scratch == 0 {
            return Err(crate::error::CoreError::Config("scan_scratch must be > 0".into()));
        }
        if self.max_event_size() == 0 {
            return Err(crate::error::CoreError::Config("max_event_size must be > 0".into()));
        }
        self.session.validate()?;
        Ok(())
    }
}

fn default_event_channel_depth() -> usize {
    4096
}

fn default_scan_scratch() -> usize {
    65_536
}
