use std::path::PathBuf;
use std::process::ExitStatus;

/// Failure while running an external tool (ffprobe or ffmpeg).
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{program:?} timed out after {secs} seconds")]
    Timeout { program: PathBuf, secs: u64 },
    #[error("I/O error while waiting for tool: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while analysing a source file.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("Failed to analyze audio file: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("Failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No audio stream found in file")]
    NoAudioStream,
}

/// Failure while transcoding a single file.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("Tag error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File has no writable tag")]
    NoTag,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Source directory does not exist: {0:?}")]
    NotFound(PathBuf),
    #[error("Source path is not a directory: {0:?}")]
    NotADirectory(PathBuf),
    #[error("Unsupported target codec: {0}")]
    UnsupportedCodec(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("{source}")]
    Analysis {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },
    #[error("Conversion failed: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },
    #[error("Copy failed: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Output file missing after processing: {0:?}")]
    MissingOutput(PathBuf),
    #[error("Output path {output:?} is already used by {owner:?}")]
    OutputConflict { output: PathBuf, owner: PathBuf },
    #[error("I/O error during processing of {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not apply metadata to {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },
    #[error("Failed to write report {path:?}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
