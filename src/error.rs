//! Main Crate Error

#[derive(thiserror::Error, Debug)]
/// Kadmos crate error enum.
pub enum Error {
    /// A supplied endpoint cannot be turned into an identifier.
    #[error("cannot derive an identifier from endpoint: {0}")]
    Address(String),

    /// An id was built from a byte slice of the wrong length.
    #[error("invalid id size: {0}")]
    InvalidIdSize(usize),

    /// An id's textual form is not 40 hex characters.
    #[error("invalid hex-encoded id: {0}")]
    InvalidIdEncoding(String),

    /// A message transaction_id is not two bytes.
    #[error("invalid transaction_id: {0:?}")]
    InvalidTransactionId(Vec<u8>),

    #[error("failed to parse packet bytes: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
