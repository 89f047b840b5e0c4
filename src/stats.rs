use crate::processor::{Action, ConversionResult};

/// Summary of a batch, always recomputed from the full result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStatistics {
    pub total: usize,
    pub converted: usize,
    pub copied: usize,
    pub errors: usize,
    pub total_source_size: u64,
    pub total_target_size: u64,
    /// Negative when the output is larger than the input
    pub space_saved: i64,
    pub space_saved_percent: f64,
}

impl BatchStatistics {
    pub fn from_results(results: &[ConversionResult]) -> Self {
        let mut stats = results.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            match r.action {
                Action::Converted => acc.converted += 1,
                Action::Copied => acc.copied += 1,
                Action::Error => acc.errors += 1,
            }
            acc.total_source_size += r.source_size;
            acc.total_target_size += r.target_size;
            acc
        });
        stats.space_saved = stats.total_source_size as i64 - stats.total_target_size as i64;
        stats.space_saved_percent = if stats.total_source_size > 0 {
            stats.space_saved as f64 / stats.total_source_size as f64 * 100.0
        } else {
            0.0
        };
        stats
    }

    /// Share of files that did not end in an error, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.errors) as f64 / self.total as f64 * 100.0
    }
}
