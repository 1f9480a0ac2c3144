use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Directory query failed: {0}")]
    DirectoryQueryFailed(String),
    #[error("No application can open {0}")]
    NoHandlerForResource(String),
    #[error("Discovery unavailable: {0}")]
    DiscoveryUnavailable(String),
    #[error("No entry at index {0}")]
    NoSuchEntry(usize),
    #[error("Cannot launch {0}: {1}")]
    LaunchFailed(String, String),
}

impl BrowserError {
    pub fn directory_query_failed(action: &str, message: impl std::fmt::Display) -> Self {
        BrowserError::DirectoryQueryFailed(format!("{action}: {message}"))
    }

    pub fn launch_failed(what: &str, message: impl std::fmt::Display) -> Self {
        BrowserError::LaunchFailed(what.to_string(), message.to_string())
    }
}
