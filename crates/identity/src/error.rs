//! Error types for identity generation and key parsing.

use libp2p_identity::KeyType;
use thiserror::Error;

/// Identity material could not be produced.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The entropy source failed to produce random bytes.
    #[error("entropy source failed: {0}")]
    Entropy(#[from] rand_core::Error),

    /// The drawn seed could not be turned into a key.
    #[error("failed to derive key: {0}")]
    Key(#[from] KeyParsingError),
}

/// Error when decoding a [`PeerId`](crate::PeerId), [`PrivateKey`](crate::PrivateKey)
/// or [`ClusterSecret`](crate::ClusterSecret).
#[derive(Debug, Error)]
pub enum KeyParsingError {
    #[error("invalid peer id: {0}")]
    PeerId(#[from] libp2p_identity::ParseError),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The bytes are not a valid libp2p key.
    #[error(transparent)]
    Key(#[from] libp2p_identity::DecodingError),

    #[error("unsupported key type {key_type:?}")]
    UnsupportedKeyType { key_type: KeyType },
}
