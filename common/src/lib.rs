use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;
use url::ParseError;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The input location could not be listed or read. Aborts the run.
    #[error("Source unavailable at {location}: {message}")]
    SourceUnavailable { location: String, message: String },

    /// A single record failed to parse or validate. The record is dropped.
    #[error("Malformed record in {source_path} line {line}: {reason}")]
    MalformedRecord {
        source_path: String,
        line: usize,
        reason: String,
    },

    /// The output location could not be written. Aborts the run.
    #[error("Sink unavailable for table {table}: {message}")]
    SinkUnavailable { table: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn source_unavailable(location: impl Into<String>, message: impl ToString) -> Self {
        Error::SourceUnavailable {
            location: location.into(),
            message: message.to_string(),
        }
    }

    pub fn sink_unavailable(table: impl Into<String>, message: impl ToString) -> Self {
        Error::SinkUnavailable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Record-level failures are recovered by dropping the record; everything
    /// else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::MalformedRecord { .. })
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}
