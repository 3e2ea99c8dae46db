use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("connection closed before a full frame was read")]
    Eof,
    #[error("declared frame length {declared} exceeds the maximum of {max} bytes")]
    FrameTooLarge { declared: usize, max: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}
