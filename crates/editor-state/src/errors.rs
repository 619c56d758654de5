pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Core(#[from] editor_core::errors::CoreError),

    /// One step of the write / backup / swap sequence failed. `path` is the
    /// file that step was writing or renaming.
    #[error("failed to save {}", path.display())]
    Save {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Something outside the session still holds the mapped file.
    #[error("{} is still in use", path.display())]
    Busy { path: std::path::PathBuf },
}

impl From<io::errors::MappedFileError> for StateError {
    fn from(error: io::errors::MappedFileError) -> Self {
        StateError::Core(error.into())
    }
}
