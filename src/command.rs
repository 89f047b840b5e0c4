use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use crate::codec::TargetCodec;
use crate::error::EncodeError;
use crate::tool::{run_tool, stderr_text};

/// Builds the ffmpeg argument vector that transcodes `input` into `output`.
///
/// Metadata is mapped from the input and an existing output is overwritten.
/// `bitrate_kbps` is ignored for flac.
pub fn build_encode_args(
    input: &Path,
    output: &Path,
    codec: TargetCodec,
    bitrate_kbps: u32,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        input.as_os_str().to_owned(),
        "-y".into(),
    ];

    let bitrate = format!("{bitrate_kbps}k");
    match codec {
        TargetCodec::Mp3 => push(&mut args, &["-c:a", "libmp3lame", "-b:a", bitrate.as_str()]),
        TargetCodec::Aac => {
            push(&mut args, &["-c:a", "aac", "-b:a", bitrate.as_str()]);
            // keep embedded cover art as-is
            push(&mut args, &["-c:v", "copy"]);
        }
        TargetCodec::Flac => push(&mut args, &["-c:a", "flac", "-compression_level", "8"]),
        TargetCodec::Opus => push(&mut args, &["-c:a", "libopus", "-b:a", bitrate.as_str()]),
    }

    push(&mut args, &["-map_metadata", "0"]);

    if codec == TargetCodec::Aac {
        push(&mut args, &["-movflags", "+faststart", "-f", "mp4"]);
    }

    args.push(output.as_os_str().to_owned());
    args
}

fn push(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

/// Transcodes one file. Implementations must be callable from several
/// workers at once.
pub trait Encoder: Send + Sync {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        codec: TargetCodec,
        bitrate_kbps: u32,
    ) -> Result<(), EncodeError>;
}

/// Encoder backed by the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", None)
    }
}

impl Encoder for FfmpegEncoder {
    fn encode(
        &self,
        input: &Path,
        output: &Path,
        codec: TargetCodec,
        bitrate_kbps: u32,
    ) -> Result<(), EncodeError> {
        let args = build_encode_args(input, output, codec, bitrate_kbps);
        let result = run_tool(&self.ffmpeg_path, &args, self.timeout)?;
        if !result.status.success() {
            return Err(EncodeError::Failed {
                status: result.status,
                stderr: last_lines(&stderr_text(&result), 5),
            });
        }
        debug!(
            "Encoded {:?} -> {:?}",
            input.file_name().unwrap_or_default(),
            output.file_name().unwrap_or_default()
        );
        Ok(())
    }
}

/// ffmpeg prints its banner and stream map before the actual error
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
