pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The file could not be opened or mapped.
    #[error(transparent)]
    Open(#[from] io::errors::MappedFileError),

    /// The background line scanner could not be started.
    #[error("failed to spawn line index scanner: {0}")]
    Spawn(#[source] std::io::Error),
}
