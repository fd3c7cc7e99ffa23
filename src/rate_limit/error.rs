//! Rate Limit Error Types

/// Error types for rate limit checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Negative limit or window, or a window too large to represent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
