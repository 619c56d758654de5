pub type MappedFileResult<T> = Result<T, MappedFileError>;

/// Failures that can happen while opening and mapping a file.
///
/// Distinguishes the cases a caller usually reports differently to the user.
#[derive(Debug, thiserror::Error)]
pub enum MappedFileError {
    #[error("file not found: {}", path.display())]
    NotFound { path: std::path::PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: std::path::PathBuf },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MappedFileError {
    /// Classifies an OS error raised while working on `path`.
    #[must_use]
    pub fn from_io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();

        match source.kind() {
            std::io::ErrorKind::NotFound => MappedFileError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => MappedFileError::PermissionDenied { path },
            _ => MappedFileError::Io { path, source },
        }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            MappedFileError::NotFound { path }
            | MappedFileError::PermissionDenied { path }
            | MappedFileError::Io { path, .. } => path,
        }
    }
}
