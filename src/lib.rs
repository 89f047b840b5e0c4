/// Module for running a batch over a worker pool
pub mod batch;
/// Module for target codecs
pub mod codec;
/// Module for building encoder invocations
pub mod command;
/// Module for error handling
pub mod error;
/// Module for copying tags between files
pub mod metadata;
/// Module for deciding whether a file needs transcoding
pub mod policy;
/// Module for probing audio files
pub mod probe;
/// Module for processing a single file
pub mod processor;
/// Module for terminal progress output
pub mod progress;
/// Module for the markdown conversion report
pub mod report;
/// Module for discovering audio files
pub mod scan;
/// Module for aggregate statistics
pub mod stats;
/// Module for running external tools
pub mod tool;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use log::info;

pub use crate::batch::{BatchObserver, BatchOrchestrator, BatchOutcome, NoopObserver};
pub use crate::codec::TargetCodec;
pub use crate::error::Error;
pub use crate::processor::{Action, ConversionRequest, ConversionResult, FileProcessor};
pub use crate::stats::BatchStatistics;

use crate::command::FfmpegEncoder;
use crate::metadata::LoftyStore;
use crate::probe::FfprobeProber;

/// Configuration options for a conversion run
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Directory scanned recursively for audio files
    pub source_dir: PathBuf,
    /// Root of the converted library; mirrors the source tree
    pub target_dir: PathBuf,
    pub codec: TargetCodec,
    /// Target bitrate in kbps. Ignored for lossless codecs
    pub bitrate_kbps: u32,
    /// Number of worker threads, default to half the CPU cores
    pub num_threads: Option<usize>,
    /// Analyze and classify only, write nothing
    pub dry_run: bool,
    /// Per-invocation limit for ffprobe and ffmpeg
    pub tool_timeout: Option<Duration>,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        ConversionOptions {
            source_dir: PathBuf::from("music"),
            target_dir: PathBuf::from("music-converted"),
            codec: TargetCodec::Mp3,
            bitrate_kbps: 320,
            num_threads: None,
            dry_run: false,
            tool_timeout: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl ConversionOptions {
    /// Bitrate handed to the policy and encoder, 0 for lossless targets
    pub fn effective_bitrate(&self) -> u32 {
        self.codec.effective_bitrate(self.bitrate_kbps)
    }

    pub fn thread_count(&self) -> usize {
        self.num_threads.unwrap_or_else(default_thread_count)
    }
}

/// Half of the available cores, at least one
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// Validates conversion options before any work starts
pub fn validate_options(options: &ConversionOptions) -> Result<(), Error> {
    if !options.source_dir.exists() {
        return Err(Error::NotFound(options.source_dir.clone()));
    }
    if !options.source_dir.is_dir() {
        return Err(Error::NotADirectory(options.source_dir.clone()));
    }
    if options.num_threads == Some(0) {
        return Err(Error::InvalidOptions(
            "Thread count must be at least 1".to_string(),
        ));
    }
    if !options.codec.is_lossless() && options.bitrate_kbps == 0 {
        return Err(Error::InvalidOptions(format!(
            "A bitrate is required for {}",
            options.codec
        )));
    }
    if options.target_dir == options.source_dir {
        return Err(Error::InvalidOptions(format!(
            "Target directory must differ from the source directory: {:?}",
            options.target_dir
        )));
    }
    if options.target_dir.exists() && !options.target_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Target path exists but is not a directory: {:?}",
            options.target_dir
        )));
    }
    Ok(())
}

/// Validates the options and lists the audio files to convert
pub fn scan_source(options: &ConversionOptions) -> Result<Vec<PathBuf>, Error> {
    validate_options(options)?;
    info!("Discovering audio files in {:?}...", options.source_dir);
    let files = scan::find_audio_files(&options.source_dir);
    info!("Found {} audio files.", files.len());
    Ok(files)
}

/// Converts `files` with the ffmpeg/ffprobe/lofty backends.
///
/// Setting `cancel` stops workers from picking up new files.
pub fn convert_files(
    options: &ConversionOptions,
    files: &[PathBuf],
    observer: &dyn BatchObserver,
    cancel: Arc<AtomicBool>,
) -> Result<BatchOutcome, Error> {
    if files.is_empty() {
        info!("No audio files found.");
        return Ok(BatchOutcome::default());
    }
    if !options.dry_run && !options.target_dir.exists() {
        fs::create_dir_all(&options.target_dir).map_err(|e| Error::Io {
            path: options.target_dir.clone(),
            source: e,
        })?;
        info!("Created target directory: {:?}", options.target_dir);
    }

    let processor = FileProcessor::new(
        &options.source_dir,
        &options.target_dir,
        Box::new(FfprobeProber::new(&options.ffprobe_path, options.tool_timeout)),
        Box::new(FfmpegEncoder::new(&options.ffmpeg_path, options.tool_timeout)),
    )
    .dry_run(options.dry_run);
    let orchestrator = BatchOrchestrator::new(processor, Box::new(LoftyStore), options.thread_count())
        .with_cancel_flag(cancel);

    let outcome = orchestrator.run(files, options.codec, options.effective_bitrate(), observer)?;
    let stats = outcome.statistics();
    info!(
        "Processing complete. {} converted, {} copied, {} failed.",
        stats.converted, stats.copied, stats.errors
    );
    Ok(outcome)
}

/// Scans `options.source_dir` and converts everything found
pub fn convert_folder(
    options: &ConversionOptions,
    observer: &dyn BatchObserver,
) -> Result<BatchOutcome, Error> {
    let files = scan_source(options)?;
    convert_files(options, &files, observer, Arc::new(AtomicBool::new(false)))
}
