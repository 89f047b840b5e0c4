use std::borrow::Cow;
use std::fs::{self, FileTimes};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use strum_macros::Display;

use crate::codec::TargetCodec;
use crate::command::Encoder;
use crate::error::Error;
use crate::policy::{Decision, decide};
use crate::probe::{AudioInfo, Prober};

/// One unit of work: a source file and what to turn it into
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub source_path: PathBuf,
    pub codec: TargetCodec,
    /// kbps, ignored for flac
    pub bitrate_kbps: u32,
}

impl ConversionRequest {
    pub fn new(source_path: impl Into<PathBuf>, codec: TargetCodec, bitrate_kbps: u32) -> Self {
        Self {
            source_path: source_path.into(),
            codec,
            bitrate_kbps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Converted,
    Copied,
    Error,
}

impl From<Decision> for Action {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Convert => Self::Converted,
            Decision::Copy => Self::Copied,
        }
    }
}

/// Outcome of processing a single source file
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub source_path: PathBuf,
    /// Equal to `source_path` when no target was produced
    pub target_path: PathBuf,
    pub action: Action,
    pub source_size: u64,
    /// 0 on error
    pub target_size: u64,
    /// Absent on error
    pub source_format: Option<AudioInfo>,
    pub error_message: Option<String>,
}

impl ConversionResult {
    /// An error result for a file that produced no output
    pub fn failed(source_path: impl Into<PathBuf>, source_size: u64, message: impl Into<String>) -> Self {
        let source_path = source_path.into();
        Self {
            target_path: source_path.clone(),
            source_path,
            action: Action::Error,
            source_size,
            target_size: 0,
            source_format: None,
            error_message: Some(message.into()),
        }
    }

    /// Bytes saved by this file; negative when the output grew
    pub fn size_saved(&self) -> i64 {
        self.source_size as i64 - self.target_size as i64
    }

    pub fn file_name(&self) -> Cow<'_, str> {
        self.source_path
            .file_name()
            .unwrap_or(self.source_path.as_os_str())
            .to_string_lossy()
    }
}

struct Plan {
    info: AudioInfo,
    source_size: u64,
    output: PathBuf,
    decision: Decision,
}

/// Runs the probe → decide → convert-or-copy → measure pipeline for one file.
///
/// Never fails: every problem is folded into an `Action::Error` result.
pub struct FileProcessor {
    source_root: PathBuf,
    target_root: PathBuf,
    prober: Box<dyn Prober>,
    encoder: Box<dyn Encoder>,
    dry_run: bool,
}

impl FileProcessor {
    pub fn new(
        source_root: impl Into<PathBuf>,
        target_root: impl Into<PathBuf>,
        prober: Box<dyn Prober>,
        encoder: Box<dyn Encoder>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            target_root: target_root.into(),
            prober,
            encoder,
            dry_run: false,
        }
    }

    /// In dry-run mode files are probed and classified but nothing is written.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Where `source` lands under the target root for `codec`
    pub fn output_path(&self, source: &Path, codec: TargetCodec) -> Result<PathBuf, Error> {
        let relative = pathdiff::diff_paths(source, &self.source_root)
            .filter(|rel| !rel.starts_with(".."))
            .ok_or_else(|| Error::Io {
                path: source.to_path_buf(),
                source: io::Error::other("Failed to calculate relative path"),
            })?;
        Ok(self
            .target_root
            .join(relative)
            .with_extension(codec.extension()))
    }

    pub fn process(&self, request: &ConversionRequest) -> ConversionResult {
        let source = &request.source_path;
        debug!("Processing: {:?}", source.file_name().unwrap_or_default());

        let plan = match self.plan(request) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Failed to analyze {:?}: {}", source, e);
                return ConversionResult::failed(source, file_size(source), e.to_string());
            }
        };

        if self.dry_run {
            return ConversionResult {
                source_path: source.clone(),
                target_path: plan.output,
                action: plan.decision.into(),
                source_size: plan.source_size,
                target_size: plan.source_size,
                source_format: Some(plan.info),
                error_message: None,
            };
        }

        match self.execute(request, &plan) {
            Ok(target_size) => ConversionResult {
                source_path: source.clone(),
                target_path: plan.output,
                action: plan.decision.into(),
                source_size: plan.source_size,
                target_size,
                source_format: Some(plan.info),
                error_message: None,
            },
            Err(e) => {
                warn!("{:?}: {}", source.file_name().unwrap_or_default(), e);
                ConversionResult::failed(source, plan.source_size, e.to_string())
            }
        }
    }

    fn plan(&self, request: &ConversionRequest) -> Result<Plan, Error> {
        let source = &request.source_path;
        let info = self.prober.probe(source).map_err(|e| Error::Analysis {
            path: source.clone(),
            source: e,
        })?;
        let source_size = fs::metadata(source)
            .map_err(|e| Error::Io {
                path: source.clone(),
                source: e,
            })?
            .len();
        let output = self.output_path(source, request.codec)?;
        let decision = decide(&info, request.codec, request.bitrate_kbps);
        debug!(
            "  -> {} ({} @ {:?} bps -> {})",
            decision, info.codec, info.bitrate, request.codec
        );
        Ok(Plan {
            info,
            source_size,
            output,
            decision,
        })
    }

    /// Performs the planned action and returns the size of the written file
    fn execute(&self, request: &ConversionRequest, plan: &Plan) -> Result<u64, Error> {
        let source = &request.source_path;
        if let Some(parent) = plan.output.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        match plan.decision {
            Decision::Convert => {
                if let Err(e) = self.encoder.encode(
                    source,
                    &plan.output,
                    request.codec,
                    request.codec.effective_bitrate(request.bitrate_kbps),
                ) {
                    remove_partial_output(&plan.output);
                    return Err(Error::Encode {
                        path: source.clone(),
                        source: e,
                    });
                }
            }
            Decision::Copy => {
                copy_preserving_times(source, &plan.output).map_err(|e| Error::Copy {
                    path: source.clone(),
                    source: e,
                })?;
            }
        }

        match fs::metadata(&plan.output) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(Error::MissingOutput(plan.output.clone())),
        }
    }
}

/// Size of `path` in bytes, 0 when it cannot be read
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn copy_preserving_times(from: &Path, to: &Path) -> io::Result<u64> {
    let bytes = fs::copy(from, to)?;
    let meta = fs::metadata(from)?;
    let mut times = FileTimes::new().set_modified(meta.modified()?);
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    fs::File::options().write(true).open(to)?.set_times(times)?;
    Ok(bytes)
}

fn remove_partial_output(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial output {:?}: {}", path, e),
    }
}
