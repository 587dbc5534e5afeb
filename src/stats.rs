use serde::{Deserialize, Serialize};

/// Counters for one pipeline run. Persisted inside the checkpoint so a
/// resumed run reports totals for the whole input.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Raw pages read from the dump
    pub pages: u64,
    /// Records accepted by the sink
    pub emitted: u64,
    /// Pages that produced no record by rule
    pub dropped: u64,
    /// Pages that failed to build
    pub rejected: u64,
    /// Records the sink ignored under its conflict policy
    pub duplicates: u64,
    pub commits: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages that reached the builder but yielded nothing.
    pub fn skipped(&self) -> u64 {
        self.dropped + self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = PipelineStats::new();
        assert_eq!(stats.pages, 0);
        assert_eq!(stats.emitted, 0);
        assert_eq!(stats.skipped(), 0);
    }

    #[test]
    fn skipped_counts_dropped_and_rejected() {
        let stats = PipelineStats {
            pages: 10,
            emitted: 6,
            dropped: 3,
            rejected: 1,
            ..Default::default()
        };
        assert_eq!(stats.skipped(), 4);
    }
}
