//! Terminal progress for the command line front end.

use std::fmt::Write as _;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use log::warn;

use crate::batch::BatchObserver;
use crate::codec::TargetCodec;
use crate::processor::{Action, ConversionResult};
use crate::stats::BatchStatistics;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Drives an indicatif bar and prints one status line per finished file
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message("Processing music files");
        Self { bar }
    }

    /// Hidden bar, for runs whose output is not a terminal
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("Processing done");
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchObserver for ProgressObserver {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn on_result(&self, result: &ConversionResult, completed: usize, _total: usize) {
        self.bar.println(status_line(result));
        self.bar.set_position(completed as u64);
    }

    fn on_warning(&self, message: &str) {
        self.bar.suspend(|| warn!("{}", message));
    }
}

/// "  • song.flac - converted (30.00 MiB → 9.00 MiB)"
pub fn status_line(result: &ConversionResult) -> String {
    let name = result.file_name();
    match result.action {
        Action::Converted => format!(
            "  • {name} - converted ({} → {})",
            HumanBytes(result.source_size),
            HumanBytes(result.target_size)
        ),
        Action::Copied => format!("  • {name} - copied"),
        Action::Error => format!(
            "  • {name} - error: {}",
            result.error_message.as_deref().unwrap_or("Unknown error")
        ),
    }
}

/// Final terminal summary printed after a batch
pub fn render_summary(
    stats: &BatchStatistics,
    codec: TargetCodec,
    bitrate_kbps: u32,
    dry_run: bool,
) -> String {
    let mut out = String::new();
    let title = if dry_run {
        "Dry Run Complete"
    } else {
        "Conversion Complete!"
    };
    let _ = writeln!(out, "\n{title}\n");
    let _ = writeln!(out, "  Total Files      {:>12}", stats.total);
    let _ = writeln!(out, "  Files Converted  {:>12}", stats.converted);
    let _ = writeln!(out, "  Files Copied     {:>12}", stats.copied);
    let _ = writeln!(out, "  Errors           {:>12}", stats.errors);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  Original Size    {:>12}",
        HumanBytes(stats.total_source_size).to_string()
    );
    let _ = writeln!(
        out,
        "  Final Size       {:>12}",
        HumanBytes(stats.total_target_size).to_string()
    );
    if stats.space_saved >= 0 {
        let _ = writeln!(
            out,
            "  Space Saved      {:>12} ({:.1}%)",
            HumanBytes(stats.space_saved.unsigned_abs()).to_string(),
            stats.space_saved_percent
        );
    } else {
        let _ = writeln!(
            out,
            "  Space Increase   {:>12} ({:.1}%)",
            HumanBytes(stats.space_saved.unsigned_abs()).to_string(),
            stats.space_saved_percent.abs()
        );
    }
    let _ = writeln!(out, "\nTarget Format: {}", codec.describe(bitrate_kbps));
    if dry_run {
        let _ = writeln!(
            out,
            "Dry run: no files were written. Sizes are those of the source files."
        );
    }
    out
}
