use thiserror::Error;

/// Signage CMS request errors
#[derive(Debug, Error)]
pub enum CmsError {
    #[error("CMS request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CmsError {
    pub fn is_transient(&self) -> bool {
        match self {
            CmsError::Network(_) => true,
            CmsError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CmsError::Http { status: 401, .. })
    }
}

/// Result type for CMS operations
pub type CmsResult<T> = Result<T, CmsError>;
