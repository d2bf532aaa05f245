use std::path::PathBuf;

/// Why the measurement pass produced no usable profile.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    #[error("failed to start the engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },
    #[error("no loudness stats found in engine output")]
    NoStats,
    #[error("malformed loudness stats: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("loudness stats are missing `{0}`")]
    MissingKey(&'static str),
    #[error("loudness stat `{key}` is not a number: {value}")]
    NotNumeric { key: &'static str, value: String },
    #[error("integrated loudness is {0}, the audio is silent or too short to measure")]
    Unmeasurable(f64),
}

#[derive(thiserror::Error, Debug)]
pub enum ApplyError {
    #[error("failed to start the engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Engine `{name}` not found: {source}")]
    EngineNotFound {
        name: String,
        #[source]
        source: which::Error,
    },
    #[error("Could not analyze reference file {path}: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: AnalysisError,
    },
    #[error("Measurement failed for {path}: {source}")]
    Measurement {
        path: PathBuf,
        #[source]
        source: AnalysisError,
    },
    #[error("Normalization failed for {path}: {source}")]
    Apply {
        path: PathBuf,
        #[source]
        source: ApplyError,
    },
    #[error("Could not replace {path} with the normalized file: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not create completion marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
