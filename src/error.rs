use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("no document is available at {0}")]
    UnknownDocument(String),

    #[error("control `{label}` at {css_path} has no followable link")]
    NotFollowable { label: String, css_path: String },
}

/// A single record could not be extracted. Never aborts a traversal.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detail document {url} could not be reached")]
    Unreachable {
        url: String,
        #[source]
        source: NavigationError,
    },

    #[error("detail document {url} has no content")]
    EmptyDocument { url: String },
}
