use std::str::FromStr;

use strum_macros::Display;

use crate::error::Error;

/// Codecs the converter can encode to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TargetCodec {
    Mp3,
    Aac,
    Flac,
    Opus,
}

impl TargetCodec {
    /// All accepted codec names, in menu order
    #[inline]
    pub fn names() -> &'static [&'static str] {
        &["mp3", "aac", "flac", "opus"]
    }

    /// Extension (without the dot) of files written for this codec
    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "m4a",
            Self::Flac => "flac",
            Self::Opus => "opus",
        }
    }

    #[inline]
    pub fn is_lossless(self) -> bool {
        matches!(self, Self::Flac)
    }

    /// Bitrate actually used for this codec. Lossless targets have no
    /// bitrate constraint, which is expressed as 0.
    #[inline]
    pub fn effective_bitrate(self, bitrate_kbps: u32) -> u32 {
        if self.is_lossless() { 0 } else { bitrate_kbps }
    }

    /// Short human description, used by the summary and the report
    pub fn describe(self, bitrate_kbps: u32) -> String {
        let name = self.to_string().to_uppercase();
        if self.is_lossless() {
            format!("{name} (Lossless)")
        } else {
            format!("{name} @ {bitrate_kbps} kbps")
        }
    }
}

impl FromStr for TargetCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "aac" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            "opus" => Ok(Self::Opus),
            _ => Err(Error::UnsupportedCodec(s.to_string())),
        }
    }
}
