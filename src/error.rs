use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid artifact reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact '{name}' has type '{actual}', expected '{expected}'")]
    ArtifactTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Artifact directory {0} contains no files")]
    EmptyArtifact(String),

    #[error("Sample file '{sample}' not found in {dir}")]
    SampleNotFound { sample: String, dir: String },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Row {row}, column '{column}': '{value}' is not a number")]
    NonNumericCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Invalid price range: min {min} must not exceed max {max}")]
    InvalidPriceRange { min: f64, max: f64 },

    #[error("Cannot add '{0}' to artifact: not a regular file")]
    InvalidArtifactFile(String),

    #[error("Artifact store error: {message}")]
    Store { message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CleaningError>;
