use haven_core::session::SessionState;
use haven_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session has ended: {0}")]
    SessionEnded(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("emergency dispatch failed: {0}")]
    EscalationDispatch(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}
