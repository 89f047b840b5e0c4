//! Markdown report written next to the converted library.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::HumanBytes;
use log::info;

use crate::codec::TargetCodec;
use crate::error::Error;
use crate::processor::{Action, ConversionResult};
use crate::stats::BatchStatistics;

pub const REPORT_FILE_NAME: &str = "conversion-report.md";

/// Run-level facts the report needs besides the results themselves
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub codec: TargetCodec,
    pub bitrate_kbps: u32,
    /// Preformatted local time
    pub generated_at: String,
}

impl ReportContext {
    /// Context stamped with the current local time
    pub fn now(
        source_dir: impl Into<PathBuf>,
        target_dir: impl Into<PathBuf>,
        codec: TargetCodec,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            codec,
            bitrate_kbps: codec.effective_bitrate(bitrate_kbps),
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Formats a possibly negative byte count
pub fn signed_bytes(bytes: i64) -> String {
    let size = HumanBytes(bytes.unsigned_abs());
    if bytes < 0 {
        format!("-{size}")
    } else {
        size.to_string()
    }
}

fn codec_blurb(codec: TargetCodec) -> &'static str {
    match codec {
        TargetCodec::Mp3 => {
            "MP3 is the most widely supported audio format, compatible with virtually all devices and media players."
        }
        TargetCodec::Aac => {
            "AAC offers better quality than MP3 at the same bitrate and is the standard for Apple devices and streaming services."
        }
        TargetCodec::Flac => {
            "FLAC is a lossless format that provides perfect audio quality while reducing file size by about 40-50% compared to WAV."
        }
        TargetCodec::Opus => {
            "Opus is a modern, highly efficient codec that provides excellent quality at very low bitrates."
        }
    }
}

/// Joins the non-empty lines of `text` so it fits in a single list item
fn one_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

fn table_cell(text: &str) -> String {
    one_line(text).replace('|', "\\|")
}

fn source_format_label(result: &ConversionResult) -> String {
    match &result.source_format {
        Some(info) => match info.bitrate {
            Some(bps) => format!("{} @ {} kbps", info.codec, bps / 1000),
            None => format!("{} (VBR)", info.codec),
        },
        None => "unknown".to_string(),
    }
}

/// Renders the full report as markdown.
pub fn render_report(results: &[ConversionResult], ctx: &ReportContext) -> String {
    let stats = BatchStatistics::from_results(results);
    let codec_name = ctx.codec.to_string().to_uppercase();
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, "# Music Conversion Report\n");
    let _ = writeln!(out, "**Generated:** {}\n", ctx.generated_at);

    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "- **Source Directory:** `{}`", ctx.source_dir.display());
    let _ = writeln!(out, "- **Target Directory:** `{}`", ctx.target_dir.display());
    let _ = writeln!(out, "- **Target Codec:** {codec_name}");
    if ctx.codec.is_lossless() {
        let _ = writeln!(out, "- **Target Bitrate:** Lossless (FLAC)");
    } else {
        let _ = writeln!(out, "- **Target Bitrate:** {} kbps", ctx.bitrate_kbps);
    }

    let _ = writeln!(out, "\n## Overall Statistics\n");
    let _ = writeln!(out, "- **Total Files:** {}", stats.total);
    let _ = writeln!(out, "- **Converted:** {}", stats.converted);
    let _ = writeln!(out, "- **Copied (No Conversion Needed):** {}", stats.copied);
    let _ = writeln!(out, "- **Errors:** {}", stats.errors);
    let _ = writeln!(out, "- **Success Rate:** {:.1}%", stats.success_rate());

    let _ = writeln!(out, "\n## Space Savings\n");
    let _ = writeln!(out, "- **Original Size:** {}", HumanBytes(stats.total_source_size));
    let _ = writeln!(out, "- **Final Size:** {}", HumanBytes(stats.total_target_size));
    let label = if stats.space_saved >= 0 {
        "Space Saved"
    } else {
        "Space Increase"
    };
    let _ = writeln!(
        out,
        "- **{label}:** {} ({:.1}%)",
        HumanBytes(stats.space_saved.unsigned_abs()),
        stats.space_saved_percent.abs()
    );

    let converted: Vec<_> = results
        .iter()
        .filter(|r| r.action == Action::Converted)
        .collect();
    if !converted.is_empty() {
        let target_format = ctx.codec.describe(ctx.bitrate_kbps);
        let _ = writeln!(out, "\n## Converted Files\n");
        let _ = writeln!(
            out,
            "{} files were converted from their original format.\n",
            converted.len()
        );
        let _ = writeln!(
            out,
            "| Original File | Original Format | Target Format | Original Size | Final Size | Reduction |"
        );
        let _ = writeln!(
            out,
            "|---------------|-----------------|---------------|---------------|------------|-----------|"
        );
        for r in converted {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                table_cell(&r.file_name()),
                table_cell(&source_format_label(r)),
                target_format,
                HumanBytes(r.source_size),
                HumanBytes(r.target_size),
                signed_bytes(r.size_saved())
            );
        }
    }

    let copied: Vec<_> = results
        .iter()
        .filter(|r| r.action == Action::Copied)
        .collect();
    if !copied.is_empty() {
        let _ = writeln!(out, "\n## Copied Files (No Conversion Needed)\n");
        let _ = writeln!(
            out,
            "{} files were already in the target format and were copied directly.\n",
            copied.len()
        );
        for r in copied {
            let _ = writeln!(
                out,
                "- `{}` - Already {} - No conversion needed",
                one_line(&r.file_name()),
                source_format_label(r)
            );
        }
    }

    let errors: Vec<_> = results
        .iter()
        .filter(|r| r.action == Action::Error)
        .collect();
    if !errors.is_empty() {
        let _ = writeln!(out, "\n## Errors\n");
        let _ = writeln!(
            out,
            "{} files encountered errors during processing.\n",
            errors.len()
        );
        for r in errors {
            let _ = writeln!(
                out,
                "- `{}`: {}",
                one_line(&r.file_name()),
                one_line(r.error_message.as_deref().unwrap_or("Unknown error"))
            );
        }
    }

    let _ = writeln!(out, "\n## Conversion Details\n");
    let _ = writeln!(out, "### About This Conversion\n");
    let _ = writeln!(out, "{}\n", codec_blurb(ctx.codec));
    if ctx.codec.is_lossless() {
        let _ = writeln!(
            out,
            "Since you selected FLAC (lossless), all conversions preserve the original audio quality exactly.\n"
        );
    } else {
        let _ = writeln!(
            out,
            "The {} kbps bitrate provides a balance between audio quality and file size.\n",
            ctx.bitrate_kbps
        );
    }
    let _ = writeln!(out, "---");
    let _ = write!(out, "*Report generated by music-converter*");
    out
}

/// Writes the report to `<target_dir>/conversion-report.md` and returns its path.
pub fn write_report(results: &[ConversionResult], ctx: &ReportContext) -> Result<PathBuf, Error> {
    let path = ctx.target_dir.join(REPORT_FILE_NAME);
    write_report_to(&path, results, ctx)?;
    Ok(path)
}

fn write_report_to(
    path: &Path,
    results: &[ConversionResult],
    ctx: &ReportContext,
) -> Result<(), Error> {
    let report_err = |source| Error::Report {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(report_err)?;
    }
    fs::write(path, render_report(results, ctx)).map_err(report_err)?;
    info!("Report written to {:?}", path);
    Ok(())
}
