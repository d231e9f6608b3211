use thiserror::Error;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Required entry metadata is missing or malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// A stored record does not decode to a valid entry
    #[error("decode error: {0}")]
    Decode(String),

    /// Failure propagated from the underlying block log
    #[error("log error: {0}")]
    Log(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Wrap a block log failure.
    pub fn log(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ArchiveError::Log(Box::new(err))
    }

    /// Downcast a wrapped log failure to its concrete type.
    pub fn log_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            ArchiveError::Log(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ArchiveError::Validation(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ArchiveError::Decode(_))
    }
}

impl From<prost::DecodeError> for ArchiveError {
    fn from(e: prost::DecodeError) -> Self {
        ArchiveError::Decode(e.to_string())
    }
}
