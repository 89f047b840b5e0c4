use std::path::{Path, PathBuf};

use log::{debug, warn};
use strum_macros::Display;
use walkdir::WalkDir;

/// Audio containers recognised in the source tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SourceFormat {
    Mp3,
    M4a,
    Aac,
    Flac,
    Ogg,
    Wav,
    Wma,
}

impl SourceFormat {
    /// Returns a list of supported file extensions
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &["mp3", "m4a", "aac", "flac", "ogg", "wav", "wma"]
    }

    /// Creates a SourceFormat from a file path based on its extension
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "mp3" => Self::Mp3,
                "m4a" => Self::M4a,
                "aac" => Self::Aac,
                "flac" => Self::Flac,
                "ogg" => Self::Ogg,
                "wav" => Self::Wav,
                "wma" => Self::Wma,
                _ => return None,
            },
        )
    }
}

/// Recursively collects every supported audio file under `source_dir`,
/// sorted by full path so that repeated runs visit files in the same order.
///
/// The caller is expected to have checked that `source_dir` is a directory.
pub fn find_audio_files(source_dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let mut audio_files: Vec<PathBuf> = WalkDir::new(source_dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| SourceFormat::from_path(e.path()).is_some())
        .map(|e| e.into_path())
        .collect();
    audio_files.sort();
    debug!("Scanner found {} audio files", audio_files.len());
    audio_files
}
