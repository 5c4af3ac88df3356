//! Simulated link model: latency with jitter, datagram loss, segmentation.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for the simulated network.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// One-way latency of every link.
    #[serde(deserialize_with = "layerswitch_types::time::deserialize")]
    pub latency: Duration,

    /// Jitter as a fraction of the latency (0.0 - 1.0).
    pub jitter_fraction: f64,

    /// Datagram loss rate (0.0 - 1.0). Stream segments are never lost.
    pub packet_loss_rate: f64,

    /// Maximum segment size; stream payloads are split into segments of at
    /// most this many bytes.
    pub mss: usize,

    /// Seed for every random choice in the run.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
            mss: 536,
            seed: 42,
        }
    }
}

impl NetworkConfig {
    /// Create a new network configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the link latency and its jitter.
    pub fn with_latency(mut self, latency: Duration, jitter_fraction: f64) -> Self {
        self.latency = latency;
        self.jitter_fraction = jitter_fraction.clamp(0.0, 1.0);
        self
    }

    /// Set the datagram loss rate.
    pub fn with_packet_loss(mut self, rate: f64) -> Self {
        self.packet_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the maximum segment size.
    pub fn with_mss(mut self, mss: usize) -> Self {
        self.mss = mss;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sample a one-way latency.
    pub fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.latency.as_secs_f64();
        let jitter_range = base * self.jitter_fraction;
        if jitter_range <= 0.0 {
            return self.latency;
        }
        let jitter = rng.gen_range(-jitter_range..jitter_range);
        let latency_secs = (base + jitter).max(0.001);

        Duration::from_secs_f64(latency_secs)
    }

    /// Whether a datagram should be dropped.
    pub fn should_drop_packet(&self, rng: &mut ChaCha8Rng) -> bool {
        self.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.packet_loss_rate
    }

    /// Segment size actually used; a zero MSS means no segmentation.
    pub fn segment_size(&self) -> usize {
        if self.mss == 0 {
            usize::MAX
        } else {
            self.mss
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_zero_jitter_is_exact() {
        let config = NetworkConfig::new().with_latency(Duration::from_secs_f64(2.5), 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..10 {
            assert_eq!(config.sample_latency(&mut rng), Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = NetworkConfig::new().with_latency(Duration::from_millis(100), 0.2);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let latency = config.sample_latency(&mut rng);
            assert!(latency >= Duration::from_millis(79));
            assert!(latency <= Duration::from_millis(121));
        }
    }

    #[test]
    fn test_no_loss_by_default() {
        let config = NetworkConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!((0..1000).all(|_| !config.should_drop_packet(&mut rng)));
    }

    #[test]
    fn test_full_loss_drops_everything() {
        let config = NetworkConfig::new().with_packet_loss(1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!((0..100).all(|_| config.should_drop_packet(&mut rng)));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: NetworkConfig = toml::from_str(
            r#"
            latency = 0.5
            packet_loss_rate = 0.1
            seed = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.latency, Duration::from_millis(500));
        assert_eq!(config.packet_loss_rate, 0.1);
        assert_eq!(config.mss, 536);
        assert_eq!(config.seed, 9);
    }
}
