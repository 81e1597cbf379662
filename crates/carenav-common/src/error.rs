/// Error types shared by the CareNav crates.
///
/// Guidance retrieval never surfaces an error to callers (see `guidance`), so these cover
/// caller input, client configuration, history storage and record decoding. Server-specific
/// errors wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("unsupported language code: '{0}'")]
    UnknownLanguage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("redis is not configured")]
    RedisDisabled,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("invalid report record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
}
