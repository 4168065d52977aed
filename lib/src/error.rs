/// Failures that cross the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaygError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("live transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("match has no id yet")]
    NoId,
}
