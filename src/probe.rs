use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::error::ProbeError;
use crate::tool::{run_tool, stderr_text};

/// Audio stream properties of a source file, captured once at analysis time
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    /// Lowercase codec name as reported by the probe, e.g. "mp3" or "flac"
    pub codec: String,
    /// Bits per second. Absent for VBR files that report no rate.
    pub bitrate: Option<u64>,
    pub sample_rate: Option<u32>,
    /// Seconds
    pub duration: Option<f64>,
    pub channels: Option<u32>,
}

impl AudioInfo {
    /// Minimal info with only a codec and bitrate, handy for callers that
    /// construct decisions by hand.
    pub fn new(codec: impl Into<String>, bitrate: Option<u64>) -> Self {
        Self {
            codec: codec.into().to_lowercase(),
            bitrate,
            sample_rate: None,
            duration: None,
            channels: None,
        }
    }
}

/// Reads stream properties of an audio file.
///
/// Implementations must be callable from several workers at once.
pub trait Prober: Send + Sync {
    fn probe(&self, path: &Path) -> Result<AudioInfo, ProbeError>;
}

/// Prober backed by the `ffprobe` executable
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    timeout: Option<Duration>,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }

    fn args(path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(path.as_os_str().to_owned());
        args
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe", None)
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<AudioInfo, ProbeError> {
        let output = run_tool(&self.ffprobe_path, &Self::args(path), self.timeout)?;
        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status,
                stderr: stderr_text(&output),
            });
        }
        let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "Probed {:?}: {} @ {:?} bps",
            path.file_name().unwrap_or_default(),
            info.codec,
            info.bitrate
        );
        Ok(info)
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    bit_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Parses `ffprobe -print_format json -show_format -show_streams` output.
///
/// The first audio stream wins. Its bit rate falls back to the container
/// bit rate when the stream does not report one.
pub fn parse_probe_output(output: &str) -> Result<AudioInfo, ProbeError> {
    let probe: ProbeOutput = serde_json::from_str(output)?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or(ProbeError::NoAudioStream)?;

    let bitrate = stream
        .bit_rate
        .as_deref()
        .or(probe.format.bit_rate.as_deref())
        .and_then(|b| b.trim().parse::<u64>().ok());

    Ok(AudioInfo {
        codec: stream
            .codec_name
            .as_deref()
            .unwrap_or("unknown")
            .to_lowercase(),
        bitrate,
        sample_rate: stream
            .sample_rate
            .as_deref()
            .and_then(|r| r.trim().parse().ok())
            .filter(|r| *r > 0),
        duration: probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse().ok()),
        channels: stream.channels,
    })
}
