use thiserror::Error;

/// Core error type for threadtrace.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} is required")]
    MissingEnv(&'static str),

    #[error("rate limited by provider {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("upstream error from {provider}: {code} {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("telemetry: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChatError {
    /// Short, stable label for logs and span attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MissingEnv(_) => "missing_env",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::ProviderError { .. } => "provider_error",
            Self::Telemetry(_) => "telemetry",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, ChatError>;
