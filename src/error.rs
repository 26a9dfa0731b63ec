//! Error types for roster-mailer.

/// Request-level error type. The display text is what clients see.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Error processing file: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Rejections raised before any byte of the upload is parsed.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Invalid file type. Allowed types: {allowed}")]
    UnsupportedExtension { extension: String, allowed: String },

    #[error("File size exceeds {}MB limit", limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },

    #[error("Malformed upload request: {0}")]
    MalformedRequest(String),
}

/// Upload-time errors. None of these touch the stored batch.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Error processing file: {0}")]
    Parse(String),

    #[error("The uploaded file contains no data")]
    EmptyData,
}

impl UploadError {
    /// Stable tag used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "validation_error",
            UploadError::Parse(_) => "parse_error",
            UploadError::EmptyData => "empty_data",
        }
    }
}

impl From<csv::Error> for UploadError {
    fn from(e: csv::Error) -> Self {
        UploadError::Parse(e.to_string())
    }
}

impl From<calamine::Error> for UploadError {
    fn from(e: calamine::Error) -> Self {
        UploadError::Parse(e.to_string())
    }
}

/// Batch-level dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No data found. Please upload a valid file first.")]
    NoBatch,
}

/// Failure to hand one message to the mail relay.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: &'static str, reason: String },

    #[error("Failed to send email via {relay}: {reason}")]
    SendFailed { relay: String, reason: String },
}

/// Per-record send failures. Folded into a `SendOutcome`, never propagated
/// past the dispatch boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordError {
    #[error("Invalid email format: {recipient}")]
    Address { recipient: String },

    #[error("Failed to send email to {recipient}: {source}")]
    Delivery {
        recipient: String,
        #[source]
        source: TransportError,
    },
}
