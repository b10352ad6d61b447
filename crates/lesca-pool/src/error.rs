use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool exhausted: wait timed out")]
    Exhausted,
    #[error("circuit open: {0}")]
    CircuitOpen(#[from] lesca_reliability::CircuitError),
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),
    #[error("pool is draining, no new acquisitions accepted")]
    Draining,
    #[error("acquire cancelled")]
    Cancelled,
}

impl PoolError {
    pub fn kind(&self) -> lesca_types::ErrorKind {
        use lesca_types::ErrorKind;
        match self {
            PoolError::Exhausted => ErrorKind::PoolExhausted,
            PoolError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            PoolError::LaunchFailed(_) => ErrorKind::Transient,
            PoolError::Draining => ErrorKind::Fatal,
            PoolError::Cancelled => ErrorKind::Fatal,
        }
    }
}
