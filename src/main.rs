use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use music_batch_converter::batch::CANCELLED_MESSAGE;
use music_batch_converter::progress::{ProgressObserver, render_summary};
use music_batch_converter::report::{ReportContext, write_report};
use music_batch_converter::{
    ConversionOptions, TargetCodec, convert_files, default_thread_count, scan_source,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// source music directory
    #[arg(long, default_value = "music")]
    source: PathBuf,

    /// target directory for the converted library
    #[arg(long, default_value = "music-converted")]
    target: PathBuf,

    /// skip the confirmation prompt, default to mp3 at 320 kbps
    #[arg(short, long)]
    force: bool,

    /// target codec: mp3, aac, flac or opus
    #[arg(short, long)]
    codec: Option<String>,

    /// target bitrate in kbps, ignored for flac
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// number of worker threads, default to half the CPU cores
    #[arg(short, long)]
    threads: Option<usize>,

    /// analyze and classify files without writing anything
    #[arg(long)]
    dry_run: bool,

    /// kill ffprobe/ffmpeg after this many seconds per file
    #[arg(long)]
    timeout: Option<u64>,

    /// ffmpeg executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe executable
    #[arg(long, env = "FFPROBE_PATH", default_value = "ffprobe")]
    ffprobe: PathBuf,
}

impl Cli {
    fn interactive(&self) -> bool {
        !self.force && self.codec.is_none() && self.bitrate.is_none()
    }

    fn into_options(self) -> Result<ConversionOptions> {
        let defaults = ConversionOptions::default();
        let codec = match &self.codec {
            Some(name) => name.parse::<TargetCodec>()?,
            None => defaults.codec,
        };
        Ok(ConversionOptions {
            source_dir: std::path::absolute(&self.source)?,
            target_dir: std::path::absolute(&self.target)?,
            codec,
            bitrate_kbps: self.bitrate.unwrap_or(defaults.bitrate_kbps),
            num_threads: self.threads,
            dry_run: self.dry_run,
            tool_timeout: self.timeout.map(Duration::from_secs),
            ffmpeg_path: self.ffmpeg,
            ffprobe_path: self.ffprobe,
        })
    }
}

fn print_preview(options: &ConversionOptions, total_files: usize) {
    println!("\nConversion Preview:");
    println!("  Source Directory:  {}", options.source_dir.display());
    println!("  Target Directory:  {}", options.target_dir.display());
    println!("  Files to Process:  {}", total_files);
    println!("  Target Codec:      {}", options.codec.to_string().to_uppercase());
    if options.codec.is_lossless() {
        println!("  Target Bitrate:    Lossless");
    } else {
        println!("  Target Bitrate:    {} kbps", options.bitrate_kbps);
    }
    println!("  Threads:           {}", options.thread_count());
    if options.dry_run {
        println!("  Mode:              dry run");
    }
}

/// Defaults to yes on an empty answer
fn confirm(question: &str) -> Result<bool> {
    print!("\n{question} [Y/n] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn main() -> Result<()> {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_filters("lofty=warn")
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();
    let interactive = cli.interactive();
    let options = cli.into_options()?;

    info!("Starting music conversion with options:");
    info!("  Source Directory: {:?}", options.source_dir);
    info!("  Target Directory: {:?}", options.target_dir);
    info!("  Target Format: {}", options.codec.describe(options.bitrate_kbps));
    match options.num_threads {
        Some(n) => info!("  Threads: {}", n),
        None => info!("  Threads: Default ({})", default_thread_count()),
    }
    info!("---");

    let files = scan_source(&options).context("Could not scan the source directory")?;
    if files.is_empty() {
        println!("No audio files found in {}", options.source_dir.display());
        return Ok(());
    }

    print_preview(&options, files.len());
    if interactive && !confirm("Start conversion?")? {
        bail!("Conversion cancelled by user");
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || {
            cancel.store(true, Ordering::SeqCst);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    let observer = ProgressObserver::new();
    let outcome = convert_files(&options, &files, &observer, Arc::clone(&cancel))?;
    observer.finish();

    let stats = outcome.statistics();
    print!(
        "{}",
        render_summary(
            &stats,
            options.codec,
            options.effective_bitrate(),
            options.dry_run
        )
    );

    if !options.dry_run {
        let ctx = ReportContext::now(
            &options.source_dir,
            &options.target_dir,
            options.codec,
            options.bitrate_kbps,
        );
        match write_report(&outcome.results, &ctx) {
            Ok(path) => println!("\nDetailed report saved to: {}", path.display()),
            Err(e) => warn!("{}", e),
        }
    }

    if outcome.cancelled {
        let skipped = outcome
            .results
            .iter()
            .filter(|r| r.error_message.as_deref() == Some(CANCELLED_MESSAGE))
            .count();
        bail!(
            "Conversion cancelled by user, {} of {} files were not processed",
            skipped,
            files.len()
        );
    }
    info!("Conversion finished.");
    Ok(())
}
