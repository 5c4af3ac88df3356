//! Latency statistics shared by every node.

use hdrhistogram::Histogram;
use std::fmt;
use std::time::Duration;

/// Latency histogram for one delivery path.
///
/// Percentiles come from an HDR histogram in microseconds; count, mean,
/// min and max are tracked exactly.
pub struct LatencyStats {
    histogram: Histogram<u64>,
    count: u64,
    sum: Duration,
    min: Duration,
    max: Duration,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("histogram creation should succeed"),
            count: 0,
            sum: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }

    /// Add one sample.
    pub fn record(&mut self, sample: Duration) {
        let micros = u64::try_from(sample.as_micros()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(micros);
        self.count += 1;
        self.sum = self.sum.saturating_add(sample);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Snapshot of the distribution. All fields are zero when empty.
    pub fn summary(&self) -> LatencySummary {
        if self.count == 0 {
            return LatencySummary::default();
        }
        let mean_nanos = self.sum.as_nanos() / u128::from(self.count);
        LatencySummary {
            count: self.count,
            mean: Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX)),
            min: self.min,
            max: self.max,
            p50: Duration::from_micros(self.histogram.value_at_quantile(0.50)),
            p99: Duration::from_micros(self.histogram.value_at_quantile(0.99)),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyStats")
            .field("count", &self.count)
            .field("sum", &self.sum)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a [`LatencyStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p99: Duration,
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return f.write_str("no samples");
        }
        write!(
            f,
            "n={} mean={:.6}s min={:.6}s max={:.6}s p50={:.6}s p99={:.6}s",
            self.count,
            self.mean.as_secs_f64(),
            self.min.as_secs_f64(),
            self.max.as_secs_f64(),
            self.p50.as_secs_f64(),
            self.p99.as_secs_f64(),
        )
    }
}

/// Finish-time statistics of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlReport {
    /// Request/reply round trips over the transport.
    pub transport: LatencySummary,
    /// Direct-path round trips.
    pub direct: LatencySummary,
    /// Total datagrams reported lost.
    pub packets_lost: u64,
}

impl fmt::Display for ControlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "transport delay: {}", self.transport)?;
        writeln!(f, "direct delay:    {}", self.direct)?;
        write!(f, "packets lost:    {}", self.packets_lost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary() {
        let stats = LatencyStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.summary(), LatencySummary::default());
        assert_eq!(stats.summary().to_string(), "no samples");
    }

    #[test]
    fn test_exact_mean_min_max() {
        let mut stats = LatencyStats::new();
        stats.record(Duration::from_secs(2));
        stats.record(Duration::from_secs(4));
        stats.record(Duration::from_secs(9));
        let summary = stats.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.mean, Duration::from_secs(5));
        assert_eq!(summary.min, Duration::from_secs(2));
        assert_eq!(summary.max, Duration::from_secs(9));
    }

    #[test]
    fn test_percentiles_within_histogram_precision() {
        let mut stats = LatencyStats::new();
        for ms in 1..=100 {
            stats.record(Duration::from_millis(ms));
        }
        let summary = stats.summary();
        let p50 = summary.p50.as_secs_f64();
        let p99 = summary.p99.as_secs_f64();
        assert!((p50 - 0.050).abs() < 0.001, "p50 was {p50}");
        assert!((p99 - 0.099).abs() < 0.001, "p99 was {p99}");
    }
}
