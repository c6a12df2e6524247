// crates/lipowerline-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Import options file could not be parsed: {0}")]
    OptionsFile(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
