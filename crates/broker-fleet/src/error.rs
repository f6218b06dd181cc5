use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend {0} is unreachable: {1}")]
    Unreachable(String, String),

    #[error("backend {0} timed out after {1}s")]
    Timeout(String, u64),

    #[error("backend {0} returned an error: {1}")]
    Transport(String, String),

    #[error("recipe {0} could not be loaded: {1}")]
    Recipe(String, String),
}
