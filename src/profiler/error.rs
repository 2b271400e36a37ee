use thiserror::Error;

/// Errors surfaced by the tracing session engine.
///
/// None of these are retried internally: every operation is single-shot.
/// `Consistency` is the only fatal class — it means an internal invariant
/// was violated and the trace would be corrupt if produced.
#[derive(Debug, Error)]
pub enum ProfilerError {
    /// Rejected before any mutation; the caller can fix the arguments and
    /// retry (e.g. enable with no activity kinds, or while already armed).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation arrived in the wrong lifecycle state (e.g. disable with
    /// no armed session).
    #[error("state error: {0}")]
    State(String),

    /// Internal invariant violation during finalize/merge. Aborts the
    /// disable() call rather than emitting a corrupt trace.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// The backend trace collector failed to initialize or start. The
    /// session is left Idle, never partially armed.
    #[error("backend collector unavailable: {0}")]
    BackendUnavailable(String),

    /// The result's raw trace was already exported; the underlying write is
    /// destructive and cannot be repeated.
    #[error("trace is already saved")]
    AlreadySaved,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProfilerError::Configuration("no activity kinds selected".into());
        assert_eq!(
            err.to_string(),
            "configuration error: no activity kinds selected"
        );
        assert_eq!(
            ProfilerError::AlreadySaved.to_string(),
            "trace is already saved"
        );
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(ProfilerError::Io(_))));
    }
}
