use thiserror::Error;

/// Typed error hierarchy for the routing hub.
///
/// Use at module boundaries (service operations, adapter translation to wire
/// form). Internal/leaf functions continue using `anyhow::Result` — the
/// `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A request failed validation. The message names the offending field.
    #[error("{0}")]
    InvalidInput(String),

    /// No conversation matches the requested (platform, chat id) pair.
    #[error("Conversation not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `RouterError`.
pub type RouterResult<T> = std::result::Result<T, RouterError>;

impl RouterError {
    pub fn invalid(field: &str, reason: &str) -> Self {
        RouterError::InvalidInput(format!("{} {}", field, reason))
    }
}
