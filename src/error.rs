use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipstitchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, ClipstitchError>;
