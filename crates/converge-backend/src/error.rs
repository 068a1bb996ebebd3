//! Backend error types and the not-found classifier.

use thiserror::Error;

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by the control-plane client. Never retried here;
/// retry-on-transient is the caller's responsibility.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Failed to establish or authorize a connection.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A backend-reported fault or transport failure during an RPC.
    #[error("rpc failed: {0}")]
    Rpc(String),

    /// The caller's deadline elapsed or the call was cancelled.
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

/// Classify a backend error as "entity does not exist".
///
/// The control plane reports absence inside the generic fault text
/// rather than as a distinct error code, so this matches on the message.
/// Compatibility shim: it is THE one place allowed to inspect error
/// strings; callers branch on this to pick Create vs Alter/Delete and
/// must never repeat the match themselves.
pub fn is_not_found(err: &BackendError) -> bool {
    match err {
        BackendError::Rpc(msg) => msg.contains("does not exist"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_matches_rpc_fault_text() {
        let err = BackendError::Rpc("path '/local/t1' does not exist".into());
        assert!(is_not_found(&err));
    }

    #[test]
    fn test_not_found_ignores_connection_errors() {
        let err = BackendError::Connect("endpoint does not exist in DNS".into());
        assert!(!is_not_found(&err));
        assert!(!is_not_found(&BackendError::Rpc("permission denied".into())));
    }
}
