//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Blank or whitespace-only query text. A caller mistake, not a pipeline fault.
    #[error("Query text is required")]
    EmptyQuery,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

impl DomainError {
    /// True for errors caused by caller input rather than infrastructure.
    /// The HTTP layer (out of scope here) maps these to 4xx instead of 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DomainError::EmptyQuery)
    }
}
