use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum DataError {
    // The blob is not a serialized object or was truncated
    Corrupt(String),
    // Written by a newer format than this build understands
    UnsupportedVersion(u32),
    UnknownType(String),
    TypeMismatch { expected: String, found: String },
    UnknownField(String),
    InvalidFieldValue { field: String, reason: String },
    BincodeError(Arc<bincode::Error>),
    JsonError(Arc<serde_json::Error>),
}

impl DataError {
    /// True if the bytes themselves are unusable, as opposed to describing the wrong thing
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            DataError::Corrupt(_)
                | DataError::UnsupportedVersion(_)
                | DataError::UnknownType(_)
                | DataError::BincodeError(_)
        )
    }
}

impl Display for DataError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DataError::Corrupt(reason) => write!(f, "corrupt object data: {}", reason),
            DataError::UnsupportedVersion(version) => {
                write!(f, "unsupported object format version {}", version)
            }
            DataError::UnknownType(name) => write!(f, "unknown asset type {}", name),
            DataError::TypeMismatch { expected, found } => {
                write!(f, "expected asset of type {} but found {}", expected, found)
            }
            DataError::UnknownField(name) => write!(f, "unknown field {}", name),
            DataError::InvalidFieldValue { field, reason } => {
                write!(f, "invalid value for field {}: {}", field, reason)
            }
            DataError::BincodeError(e) => e.fmt(f),
            DataError::JsonError(e) => e.fmt(f),
        }
    }
}

impl Error for DataError {}

impl From<bincode::Error> for DataError {
    fn from(err: bincode::Error) -> Self {
        DataError::BincodeError(Arc::new(err))
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::JsonError(Arc::new(err))
    }
}

pub type DataResult<T> = Result<T, DataError>;
