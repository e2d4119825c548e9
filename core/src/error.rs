use thiserror::Error;

/// Protocol-visible request failures, carrying their JSON-RPC error codes.
/// The `Display` text is exactly what goes into the response's `message`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Request cancelled")]
    Cancelled,
}

impl RpcError {
    pub fn code(&self) -> i64 {
        match self {
            RpcError::MethodNotFound(_) => -32601,
            RpcError::Internal(_) => -32603,
            RpcError::Cancelled => -32800,
        }
    }
}
