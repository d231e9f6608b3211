use strand_core::ArchiveError;
use thiserror::Error;

pub type LogResult<T> = Result<T, LogError>;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("feed {0} not found")]
    NotFound(String),

    #[error("feed is already finalized")]
    Finalized,

    #[error("block {index} out of range (feed has {len} blocks)")]
    OutOfRange { index: u64, len: u64 },

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("feed has {actual} blocks, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] opendal::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("feed closed while waiting for block {0}")]
    Closed(u64),
}

impl From<LogError> for ArchiveError {
    fn from(e: LogError) -> Self {
        ArchiveError::log(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_errors_downcast_through_archive_error() {
        let err: ArchiveError = LogError::OutOfRange { index: 7, len: 3 }.into();
        assert!(err.to_string().contains("block 7 out of range"));
        assert!(matches!(
            err.log_error::<LogError>(),
            Some(LogError::OutOfRange { index: 7, len: 3 })
        ));
    }
}
