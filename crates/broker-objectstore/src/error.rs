use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "s3")]
    #[error("s3 error: {0}")]
    S3(String),
}
