use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeracamError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("unrecognized image container: leading bytes {leading:02x?}")]
    UnrecognizedFormat { leading: Vec<u8> },

    #[error("metadata field '{field}' is malformed: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("signing unavailable: {0}")]
    SigningUnavailable(String),

    #[error("invalid scoring policy: {0}")]
    Policy(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VeracamError>;
