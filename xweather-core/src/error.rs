use thiserror::Error;

use crate::cache::CacheError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between a query helper and the remote service.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid endpoint URL '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Connection refused, timeout, TLS failure, unreadable body.
    #[error("Request to Xweather failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Xweather request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode Xweather response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service answered with `success: false`.
    #[error("Xweather API error ({code}): {description}")]
    Api { code: String, description: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl Error {
    pub fn is_cache(&self) -> bool {
        matches!(self, Error::Cache(_))
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
