use thiserror::Error;

#[derive(Debug, Error)]
pub enum CensusError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (unknown counter, bad window, policy conflict, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// File extension with no table reader behind it.
    #[error("unsupported table format '{extension}' for {path}")]
    UnsupportedFormat { path: String, extension: String },
    /// Malformed CSV / JSON table text.
    #[error("source '{source_name}': malformed table: {message}")]
    TableParse { source_name: String, message: String },
    /// Missing required column in input data.
    #[error("source '{source_name}': missing column '{column}'")]
    MissingColumn { source_name: String, column: String },
    /// Timestamp parse error.
    #[error("source '{source_name}', row {row}: cannot parse timestamp '{value}'")]
    TimestampParse { source_name: String, row: usize, value: String },
    /// Non-numeric counter value.
    #[error("source '{source_name}', row {row}: cannot parse counter '{column}' from '{value}'")]
    CounterParse {
        source_name: String,
        row: usize,
        column: String,
        value: String,
    },
    /// Unit registry could not be decoded.
    #[error("registry error: {0}")]
    Registry(String),
    /// IO error (file read, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CensusError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
