//! Cluster-wide secrets handed to every replica.

use std::fmt::{self, Debug};

use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{GenerationError, KeyParsingError};
use crate::generator::{IdentityGenerator, PeerIdentity};
use crate::PeerId;

/// Length of the raw cluster secret in bytes.
pub const CLUSTER_SECRET_LENGTH: usize = 32;

/// The private network secret shared by all peers of one cluster.
///
/// IPFS Cluster expects it as 64 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ClusterSecret([u8; CLUSTER_SECRET_LENGTH]);

impl Debug for ClusterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClusterSecret(..)")
    }
}

impl ClusterSecret {
    /// Draw a new secret from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Entropy`] if the RNG fails.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, GenerationError> {
        let mut bytes = [0u8; CLUSTER_SECRET_LENGTH];
        rng.try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// The raw secret.
    pub fn as_bytes(&self) -> &[u8; CLUSTER_SECRET_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding of the secret.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    /// Parse the hex encoding produced by [`Self::to_hex`].
    ///
    /// # Errors
    ///
    /// Fails on invalid hex or a length other than 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, KeyParsingError> {
        let mut bytes = [0u8; CLUSTER_SECRET_LENGTH];
        hex::decode_to_slice(encoded.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// The cluster secret and bootstrap key, as stored.
///
/// Both values are only written when the identity store is first created;
/// later reconciliations ignore whatever is supplied here.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct BootstrapMaterial {
    cluster_secret: Vec<u8>,
    bootstrap_private_key: Vec<u8>,
}

impl Debug for BootstrapMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BootstrapMaterial(..)")
    }
}

impl BootstrapMaterial {
    /// Wrap caller-supplied values, already in their stored encoding.
    pub fn new(cluster_secret: impl Into<Vec<u8>>, bootstrap_private_key: impl Into<Vec<u8>>) -> Self {
        Self {
            cluster_secret: cluster_secret.into(),
            bootstrap_private_key: bootstrap_private_key.into(),
        }
    }

    /// Generate a fresh cluster secret and bootstrap identity.
    ///
    /// Returns the bootstrap peer id alongside, since that is what joining
    /// peers are pointed at.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] if either the RNG or the generator fails.
    pub fn generate<G, R>(generator: &mut G, rng: &mut R) -> Result<(Self, PeerId), GenerationError>
    where
        G: IdentityGenerator + ?Sized,
        R: RngCore + CryptoRng,
    {
        let secret = ClusterSecret::generate(rng)?;
        let PeerIdentity {
            peer_id,
            private_key,
        } = generator.generate()?;
        let material = Self::new(
            secret.to_hex().as_bytes(),
            private_key.to_base64().as_bytes(),
        );
        Ok((material, peer_id))
    }

    /// Stored value of `CLUSTER_SECRET`.
    pub fn cluster_secret(&self) -> &[u8] {
        &self.cluster_secret
    }

    /// Stored value of `BOOTSTRAP_PEER_PRIV_KEY`.
    pub fn bootstrap_private_key(&self) -> &[u8] {
        &self.bootstrap_private_key
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use rand::rngs::OsRng;

    use super::*;
    use crate::generator::Ed25519Generator;
    use crate::key::PrivateKey;

    #[test]
    fn test_cluster_secret_hex() {
        let secret = ClusterSecret::generate(&mut OsRng).unwrap();
        let hex = secret.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(ClusterSecret::from_hex(&hex).unwrap(), secret);
    }

    #[test]
    fn test_cluster_secret_rejects_short_hex() {
        assert!(ClusterSecret::from_hex("abcd").is_err());
        assert!(ClusterSecret::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_generated_material_is_decodable() {
        let mut generator = Ed25519Generator::default();
        let (material, peer_id) = BootstrapMaterial::generate(&mut generator, &mut OsRng).unwrap();

        let secret = std::str::from_utf8(material.cluster_secret()).unwrap();
        assert!(ClusterSecret::from_hex(secret).is_ok());

        let key = std::str::from_utf8(material.bootstrap_private_key()).unwrap();
        assert_eq!(PrivateKey::from_base64(key).unwrap().peer_id(), peer_id);
    }

    #[test]
    fn test_debug_redacts() {
        let material = BootstrapMaterial::new("secret", "key");
        assert_eq!(format!("{material:?}"), "BootstrapMaterial(..)");
    }
}
