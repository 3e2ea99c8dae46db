use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("port {0} is out of range (expected 1..=65535)")]
    PortOutOfRange(u16),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}
