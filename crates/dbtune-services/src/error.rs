use dbtune_core::DbtuneError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Database(#[from] DbtuneError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ServiceError {
    /// Whether the request failed only because the pool had no free connection
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, ServiceError::Database(e) if e.is_pool_exhausted())
    }
}
