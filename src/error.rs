//! use ssltool::error::SslToolError;

use std::time::Duration;

use thiserror::Error;

/// Represents errors that can occur in the ssltool library.
///
/// Every failure is returned to the immediate caller; the library performs no retries and never
/// returns partial output alongside an error.
#[derive(Debug, Error, Clone)]
pub enum SslToolError {
    /// Address resolution or TCP connection failed.
    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    /// The connection and handshake did not complete before the deadline.
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// TLS negotiation or peer trust validation failed.
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// The handshake completed but no TLS peer state was available.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The certificate uses a public key algorithm the encoder does not recognize.
    #[error("Unsupported public key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The private key uses an algorithm or encoding that is not supported.
    #[error("Unsupported private key type: {0}")]
    UnsupportedKeyType(String),

    /// Neither a common name nor any subject alternative name was supplied.
    #[error("at least one of CommonName or SANs must be provided")]
    InvalidSubject,

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationFailed(String),

    /// The certification request could not be signed.
    #[error("Failed to sign certificate request: {0}")]
    SigningFailed(String),

    /// The private key could not be encrypted with the supplied passphrase.
    #[error("Failed to encrypt private key: {0}")]
    KeyEncryptionFailed(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, SslToolError>;

impl From<der::Error> for SslToolError {
    /// Converts a `der::Error` into a `SslToolError`.
    fn from(err: der::Error) -> Self {
        SslToolError::DecodingError(err.to_string())
    }
}
