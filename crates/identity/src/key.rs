//! Ed25519 private keys in the libp2p protobuf key encoding.
//!
//! For Ed25519 the protobuf `Data` field is the 32-byte seed followed by the
//! 32-byte public key; base64 of the whole message is what IPFS Cluster peers
//! read their identity from.

use std::fmt::{self, Debug};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use libp2p_identity::{KeyType, Keypair, PeerId, PublicKey};
use zeroize::Zeroizing;

use crate::error::KeyParsingError;

/// Length of an Ed25519 seed.
pub const SEED_LENGTH: usize = 32;

/// An Ed25519 private key.
///
/// The protobuf encoding is computed once at construction, so encoding never
/// fails afterwards. Key material is zeroized on drop and never printed.
#[derive(Clone)]
pub struct PrivateKey {
    keypair: Keypair,
    encoded: Zeroizing<Vec<u8>>,
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(..)")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for PrivateKey {}

impl TryFrom<Keypair> for PrivateKey {
    type Error = KeyParsingError;

    fn try_from(keypair: Keypair) -> Result<Self, Self::Error> {
        if keypair.key_type() != KeyType::Ed25519 {
            return Err(KeyParsingError::UnsupportedKeyType {
                key_type: keypair.key_type(),
            });
        }
        let encoded = Zeroizing::new(keypair.to_protobuf_encoding()?);
        Ok(Self { keypair, encoded })
    }
}

impl PrivateKey {
    /// Create a private key from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Fails if libp2p rejects the seed.
    pub fn from_seed(seed: [u8; SEED_LENGTH]) -> Result<Self, KeyParsingError> {
        let mut seed = Zeroizing::new(seed);
        Self::try_from(Keypair::ed25519_from_bytes(seed.as_mut_slice())?)
    }

    /// The public half of this key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public()
    }

    /// The peer id derived from the public half of this key.
    pub fn peer_id(&self) -> PeerId {
        self.keypair.public().to_peer_id()
    }

    /// The libp2p protobuf encoding of this key.
    pub fn to_protobuf(&self) -> &[u8] {
        &self.encoded
    }

    /// The base64 (standard alphabet, padded) encoding of [`Self::to_protobuf`].
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.encoded.as_slice()))
    }

    /// Parse the libp2p protobuf encoding of an Ed25519 private key.
    ///
    /// # Errors
    ///
    /// Fails on malformed framing, a non-Ed25519 key type, or when the
    /// embedded public key does not belong to the seed.
    pub fn from_protobuf(bytes: &[u8]) -> Result<Self, KeyParsingError> {
        Self::try_from(Keypair::from_protobuf_encoding(bytes)?)
    }

    /// Parse the base64 encoding produced by [`Self::to_base64`].
    ///
    /// # Errors
    ///
    /// See [`Self::from_protobuf`]; additionally fails on invalid base64.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyParsingError> {
        let bytes = Zeroizing::new(STANDARD.decode(encoded.trim())?);
        Self::from_protobuf(&bytes)
    }
}
