use serde::Deserialize;

/// Minimum allowed ring buffer capacity.
pub const MIN_RING_CAPACITY: usize = 65_536;

/// Ring buffer sizing and backpressure configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct RingBufferConfig {
    /// Capacity in bytes. Rounded up to the next power of two; floor of
    /// 65,536. Default: 1 MiB.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Fraction of capacity at which `write` starts returning `BufferFull`.
    /// Default: 0.9
    #[serde(default = "default_high_water_frac")]
    pub high_water_frac: f64,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self { capacity: default_capacity(), high_water_frac: default_high_water_frac() }
    }
}

impl RingBufferConfig {
    /// Capacity rounded up to the next power of two, floored at
    /// [`MIN_RING_CAPACITY`].
    pub fn rounded_capacity(&self) -> usize {
        self.capacity.max(MIN_RING_CAPACITY).next_power_of_two()
    }
}

fn default_capacity() -> usize {
    1024 * 1024
}

fn default_high_water_frac() -> f64 {
    0.9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_up_to_power_of_two() {
        let cfg = RingBufferConfig { capacity: 70_000, high_water_frac: 0.9 };
        assert_eq!(cfg.rounded_capacity(), 131_072);
    }

    #[test]
    fn floors_at_minimum() {
        let cfg = RingBufferConfig { capacity: 1024, high_water_frac: 0.9 };
        assert_eq!(cfg.rounded_capacity(), MIN_RING_CAPACITY);
    }
}
