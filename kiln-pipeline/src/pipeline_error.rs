use kiln_base::{AssetPath, AssetPathError, Platform};
use kiln_data::{DataError, SchemaError};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum PipelineError {
    StringError(String),
    SourceNotFound(AssetPath),
    NoPreprocessor(Platform),
    PreprocessFailure { path: AssetPath, reason: String },
    // A cache entry on disk could not be read back
    CacheCorruption { file_path: PathBuf, reason: String },
    AssetPathError(AssetPathError),
    DataError(DataError),
    SchemaError(SchemaError),
    IoError(Arc<std::io::Error>),
    BincodeError(Arc<bincode::Error>),
    JsonError(Arc<serde_json::Error>),
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            PipelineError::StringError(_) => None,
            PipelineError::SourceNotFound(_) => None,
            PipelineError::NoPreprocessor(_) => None,
            PipelineError::PreprocessFailure { .. } => None,
            PipelineError::CacheCorruption { .. } => None,
            PipelineError::AssetPathError(ref e) => Some(e),
            PipelineError::DataError(ref e) => Some(e),
            PipelineError::SchemaError(ref e) => Some(e),
            PipelineError::IoError(ref e) => Some(&**e),
            PipelineError::BincodeError(ref e) => Some(&**e),
            PipelineError::JsonError(ref e) => Some(&**e),
        }
    }
}

impl core::fmt::Display for PipelineError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            PipelineError::StringError(ref e) => e.fmt(fmt),
            PipelineError::SourceNotFound(ref path) => {
                write!(fmt, "no source asset exists for {}", path)
            }
            PipelineError::NoPreprocessor(platform) => {
                write!(fmt, "no preprocessor registered for platform {}", platform)
            }
            PipelineError::PreprocessFailure {
                ref path,
                ref reason,
            } => write!(fmt, "preprocessing {} failed: {}", path, reason),
            PipelineError::CacheCorruption {
                ref file_path,
                ref reason,
            } => write!(fmt, "cache entry {:?} is corrupt: {}", file_path, reason),
            PipelineError::AssetPathError(ref e) => e.fmt(fmt),
            PipelineError::DataError(ref e) => e.fmt(fmt),
            PipelineError::SchemaError(ref e) => e.fmt(fmt),
            PipelineError::IoError(ref e) => e.fmt(fmt),
            PipelineError::BincodeError(ref e) => e.fmt(fmt),
            PipelineError::JsonError(ref e) => e.fmt(fmt),
        }
    }
}

impl From<&str> for PipelineError {
    fn from(str: &str) -> Self {
        PipelineError::StringError(str.to_string())
    }
}

impl From<String> for PipelineError {
    fn from(string: String) -> Self {
        PipelineError::StringError(string)
    }
}

impl From<AssetPathError> for PipelineError {
    fn from(error: AssetPathError) -> Self {
        PipelineError::AssetPathError(error)
    }
}

impl From<DataError> for PipelineError {
    fn from(error: DataError) -> Self {
        PipelineError::DataError(error)
    }
}

impl From<SchemaError> for PipelineError {
    fn from(error: SchemaError) -> Self {
        PipelineError::SchemaError(error)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::IoError(Arc::new(error))
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(error: bincode::Error) -> Self {
        PipelineError::BincodeError(Arc::new(error))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::JsonError(Arc::new(error))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
