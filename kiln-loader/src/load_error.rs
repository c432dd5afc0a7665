use kiln_base::{AssetPath, AssetPathError};
use kiln_pipeline::PipelineError;

#[derive(Debug, Clone)]
pub enum LoadError {
    InvalidPath(AssetPathError),
    Io {
        path: AssetPath,
        reason: String,
    },
    SourceNotFound(AssetPath),
    PreprocessFailure {
        path: AssetPath,
        reason: String,
    },
    TypeMismatch {
        path: AssetPath,
        expected: String,
        found: String,
    },
    // The chain of references, starting and ending with the same asset
    CyclicDependency {
        cycle: Vec<AssetPath>,
    },
    DependencyFailed {
        dependency: AssetPath,
        error: Box<LoadError>,
    },
    // Only surfaces if an entry is still unreadable after being regenerated
    CacheCorruption {
        path: AssetPath,
        reason: String,
    },
    Pipeline {
        path: AssetPath,
        error: PipelineError,
    },
    // A blocking load had nothing left in flight that could complete it
    Stalled(AssetPath),
}

pub type LoadResult<T> = Result<T, LoadError>;

impl LoadError {
    pub(crate) fn from_pipeline(
        path: &AssetPath,
        error: PipelineError,
    ) -> Self {
        match error {
            PipelineError::SourceNotFound(path) => LoadError::SourceNotFound(path),
            PipelineError::PreprocessFailure { path, reason } => {
                LoadError::PreprocessFailure { path, reason }
            }
            PipelineError::AssetPathError(e) => LoadError::InvalidPath(e),
            PipelineError::CacheCorruption { reason, .. } => LoadError::CacheCorruption {
                path: path.clone(),
                reason,
            },
            PipelineError::IoError(e) => LoadError::Io {
                path: path.clone(),
                reason: e.to_string(),
            },
            error => LoadError::Pipeline {
                path: path.clone(),
                error,
            },
        }
    }

    /// Follows DependencyFailed down to the error that started the failure
    pub fn root_cause(&self) -> &LoadError {
        match self {
            LoadError::DependencyFailed { error, .. } => error.root_cause(),
            _ => self,
        }
    }
}

impl From<AssetPathError> for LoadError {
    fn from(error: AssetPathError) -> Self {
        LoadError::InvalidPath(error)
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::InvalidPath(e) => Some(e),
            LoadError::DependencyFailed { error, .. } => Some(&**error),
            LoadError::Pipeline { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            LoadError::InvalidPath(e) => write!(f, "invalid asset path: {}", e),
            LoadError::Io { path, reason } => write!(f, "reading {} failed: {}", path, reason),
            LoadError::SourceNotFound(path) => write!(f, "no source asset exists for {}", path),
            LoadError::PreprocessFailure { path, reason } => {
                write!(f, "preprocessing {} failed: {}", path, reason)
            }
            LoadError::TypeMismatch {
                path,
                expected,
                found,
            } => write!(f, "{} is a {}, expected a {}", path, found, expected),
            LoadError::CyclicDependency { cycle } => {
                write!(f, "cyclic asset references: ")?;
                for (i, path) in cycle.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{}", path)?;
                }
                Ok(())
            }
            LoadError::DependencyFailed { dependency, error } => {
                write!(f, "referenced asset {} failed to load: {}", dependency, error)
            }
            LoadError::CacheCorruption { path, reason } => {
                write!(f, "cache entry for {} is unreadable: {}", path, reason)
            }
            LoadError::Pipeline { path, error } => write!(f, "loading {} failed: {}", path, error),
            LoadError::Stalled(path) => {
                write!(f, "load of {} stopped making progress", path)
            }
        }
    }
}
