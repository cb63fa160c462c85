/// Pipeline errors
///
/// The taxonomy follows the commit discipline of the consumer loops: transient
/// errors are retried in place and never commit the in-flight offset; permanent
/// errors make an explicit commit decision per component.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("event bus error: {0}")]
    Bus(#[from] rdkafka::error::KafkaError),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed payload: {0}")]
    Poison(String),

    #[error("unsupported schema version {0}")]
    UnknownSchema(u32),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether a retry with backoff may succeed.
    ///
    /// Broker, cache and database failures are treated as transient wholesale:
    /// the retry budget bounds the damage when one of them is actually
    /// permanent, and the message stays uncommitted for redelivery.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Unavailable(_)
                | PipelineError::Bus(_)
                | PipelineError::Cache(_)
                | PipelineError::Database(_)
        )
    }

    /// Whether the payload itself can never be processed.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            PipelineError::Poison(_) | PipelineError::UnknownSchema(_)
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Poison(e.to_string())
    }
}

/// Result type alias for pipeline components
pub type PipelineResult<T> = Result<T, PipelineError>;
