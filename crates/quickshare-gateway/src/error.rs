use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid peer id {0:?}: expected XXXX-XXXX")]
    InvalidPeerId(String),

    #[error("connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

impl GatewayError {
    /// Status line shown to the operator.
    pub fn status(&self) -> &'static str {
        "Connection Failed"
    }
}
