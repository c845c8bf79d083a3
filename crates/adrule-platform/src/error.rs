/// Errors that can occur when talking to an advertising platform API.
///
/// # Examples
///
/// ```rust
/// use adrule_platform::error::PlatformError;
///
/// let err = PlatformError::UnsupportedPlatform("myspace".to_string());
/// assert!(err.to_string().contains("myspace"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Non-2xx status code from the platform API.
    #[error("{platform} API HTTP error: status={status}, body={body}")]
    Http {
        platform: String,
        status: u16,
        body: String,
    },

    /// 2xx status but the payload carries an error object.
    #[error("{platform} API error: code={code}, message={message}")]
    Api {
        platform: String,
        code: String,
        message: String,
    },

    /// Request was throttled by the platform.
    #[error("{platform} API rate limited")]
    RateLimited { platform: String },

    /// An underlying HTTP transport error from `reqwest`.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization or deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The call did not finish within the configured deadline.
    #[error("{platform} call timed out after {secs}s")]
    Timeout { platform: String, secs: u64 },

    /// No access token is stored for the user on this platform.
    #[error("No {platform} credentials for user {user_id}")]
    MissingCredentials { platform: String, user_id: String },

    /// The credential store itself failed.
    #[error("Credential lookup failed: {0}")]
    Credentials(String),

    /// No client is registered under the requested platform name.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Platform configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, PlatformError>;
