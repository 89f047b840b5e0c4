//! Fake backends and a temporary music library for batch tests.
//!
//! Source files are plain text "codec:bitrate" (e.g. `mp3:192000`), optionally
//! followed by padding that only changes the file size, so the
//! fake prober can classify them without real audio. A file containing
//! `broken` fails to probe.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use music_batch_converter::batch::BatchObserver;
use music_batch_converter::command::Encoder;
use music_batch_converter::error::{EncodeError, MetadataError, ProbeError, ToolError};
use music_batch_converter::metadata::{MetadataStore, TrackMetadata};
use music_batch_converter::probe::{AudioInfo, Prober};
use music_batch_converter::{
    BatchOrchestrator, ConversionResult, FileProcessor, TargetCodec, scan::find_audio_files,
};
use tempfile::TempDir;

pub struct TextProber;

impl Prober for TextProber {
    fn probe(&self, path: &Path) -> Result<AudioInfo, ProbeError> {
        let text = fs::read_to_string(path).map_err(|e| ProbeError::Tool(ToolError::Io(e)))?;
        let text = text.trim();
        if text.contains("broken") {
            return Err(ProbeError::NoAudioStream);
        }
        let head = text.split_whitespace().next().unwrap_or_default();
        let (codec, bitrate) = head.split_once(':').unwrap_or((head, ""));
        Ok(AudioInfo::new(codec, bitrate.parse().ok()))
    }
}

/// Writes an output a quarter of the source size (at least one byte).
///
/// Panics on sources containing `panic`; sets `cancel_after_first` once the
/// first encode finishes, when provided.
#[derive(Default, Clone)]
pub struct QuarterEncoder {
    pub calls: Arc<AtomicUsize>,
    pub cancel_after_first: Option<Arc<AtomicBool>>,
}

impl Encoder for QuarterEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        _codec: TargetCodec,
        _bitrate_kbps: u32,
    ) -> Result<(), EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = fs::read(input).map_err(ToolError::Io)?;
        if String::from_utf8_lossy(&source).contains("panic") {
            panic!("encoder blew up on {}", input.display());
        }
        let len = (source.len() / 4).max(1);
        fs::write(output, vec![0u8; len]).map_err(ToolError::Io)?;
        if let Some(flag) = &self.cancel_after_first {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Records every `apply`. Extraction fails for sources named `*notag*`.
#[derive(Default, Clone)]
pub struct RecordingStore {
    pub applied: Arc<Mutex<Vec<PathBuf>>>,
}

impl MetadataStore for RecordingStore {
    fn extract(&self, path: &Path) -> Result<TrackMetadata, MetadataError> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.contains("notag") {
            return Err(MetadataError::NoTag);
        }
        Ok(TrackMetadata {
            title: Some(name.into_owned()),
            ..Default::default()
        })
    }

    fn apply(&self, path: &Path, _metadata: &TrackMetadata) -> Result<(), MetadataError> {
        self.applied.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

/// Collects everything the orchestrator reports
#[derive(Default)]
pub struct CollectingObserver {
    pub started: RefCell<Option<usize>>,
    pub progress: RefCell<Vec<(usize, usize)>>,
    pub warnings: RefCell<Vec<String>>,
}

impl BatchObserver for CollectingObserver {
    fn on_start(&self, total: usize) {
        *self.started.borrow_mut() = Some(total);
    }

    fn on_result(&self, _result: &ConversionResult, completed: usize, total: usize) {
        self.progress.borrow_mut().push((completed, total));
    }

    fn on_warning(&self, message: &str) {
        self.warnings.borrow_mut().push(message.to_string());
    }
}

pub struct Library {
    pub dir: TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
}

impl Library {
    /// Creates a library from `(relative path, contents)` pairs
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("music");
        let target = dir.path().join("music-converted");
        fs::create_dir_all(&source).unwrap();
        for (rel, contents) in files {
            let path = source.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        Self {
            dir,
            source,
            target,
        }
    }

    /// A mixed library: lossless, already-good lossy, oversized lossy, broken
    pub fn mixed() -> Self {
        Self::new(&[
            ("Artist/Album/01 intro.flac", "flac:900000 padding padding padding"),
            ("Artist/Album/02 song.flac", "flac:1000000 padding padding padding padding"),
            ("Artist/Album/03 small.mp3", "mp3:128000"),
            ("Artist/Single/big.mp3", "mp3:320000 padding"),
            ("Various/close.mp3", "mp3:195000"),
            ("Various/track.ogg", "vorbis:160000 padding"),
            ("Various/old.wav", "pcm_s16le:1411000 padding padding padding padding"),
            ("Various/notag.flac", "flac:850000 padding padding"),
            ("broken.m4a", "broken"),
            ("cover.jpg", "not audio"),
        ])
    }

    pub fn files(&self) -> Vec<PathBuf> {
        find_audio_files(&self.source)
    }

    pub fn processor(&self, encoder: QuarterEncoder) -> FileProcessor {
        FileProcessor::new(
            &self.source,
            &self.target,
            Box::new(TextProber),
            Box::new(encoder),
        )
    }

    pub fn orchestrator(
        &self,
        encoder: QuarterEncoder,
        store: RecordingStore,
        threads: usize,
    ) -> BatchOrchestrator {
        BatchOrchestrator::new(self.processor(encoder), Box::new(store), threads)
    }
}

/// Results sorted by source path, for order-independent comparison
pub fn sorted(mut results: Vec<ConversionResult>) -> Vec<ConversionResult> {
    results.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    results
}
