//! Fresh peer identity generation.

use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::error::GenerationError;
use crate::key::{PrivateKey, SEED_LENGTH};
use crate::PeerId;

/// A peer id together with the private key it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub peer_id: PeerId,
    pub private_key: PrivateKey,
}

impl From<PrivateKey> for PeerIdentity {
    fn from(private_key: PrivateKey) -> Self {
        Self {
            peer_id: private_key.peer_id(),
            private_key,
        }
    }
}

/// Source of fresh peer identities.
pub trait IdentityGenerator {
    /// Produce one new identity.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] when no key material could be produced.
    fn generate(&mut self) -> Result<PeerIdentity, GenerationError>;
}

impl<G: IdentityGenerator + ?Sized> IdentityGenerator for &mut G {
    fn generate(&mut self) -> Result<PeerIdentity, GenerationError> {
        (**self).generate()
    }
}

impl<G: IdentityGenerator + ?Sized> IdentityGenerator for Box<G> {
    fn generate(&mut self) -> Result<PeerIdentity, GenerationError> {
        (**self).generate()
    }
}

/// Generates Ed25519 identities from a cryptographic RNG.
#[derive(Debug, Clone)]
pub struct Ed25519Generator<R> {
    rng: R,
}

impl<R: RngCore + CryptoRng> Ed25519Generator<R> {
    /// Create a generator drawing seeds from `rng`.
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl Default for Ed25519Generator<OsRng> {
    fn default() -> Self {
        Self::new(OsRng)
    }
}

impl<R: RngCore + CryptoRng> IdentityGenerator for Ed25519Generator<R> {
    fn generate(&mut self) -> Result<PeerIdentity, GenerationError> {
        let mut seed = Zeroizing::new([0u8; SEED_LENGTH]);
        self.rng.try_fill_bytes(seed.as_mut_slice())?;
        Ok(PeerIdentity::from(PrivateKey::from_seed(*seed)?))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    struct ExhaustedRng;

    impl RngCore for ExhaustedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand_core::Error> {
            Err(rand_core::Error::new("entropy exhausted"))
        }
    }

    impl CryptoRng for ExhaustedRng {}

    #[test]
    fn test_generated_identity_is_consistent() {
        let identity = Ed25519Generator::default().generate().unwrap();
        assert_eq!(identity.peer_id, identity.private_key.peer_id());
    }

    #[test]
    fn test_identities_are_unique() {
        let mut generator = Ed25519Generator::default();
        let ids: HashSet<String> = (0..64)
            .map(|_| generator.generate().unwrap().peer_id.to_string())
            .collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a = Ed25519Generator::new(StdRng::seed_from_u64(42)).generate().unwrap();
        let b = Ed25519Generator::new(StdRng::seed_from_u64(42)).generate().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_entropy_failure_is_reported() {
        let err = Ed25519Generator::new(ExhaustedRng).generate().unwrap_err();
        assert!(err.to_string().contains("entropy exhausted"));
    }

    #[test]
    fn test_boxed_generator() {
        let mut boxed: Box<dyn IdentityGenerator> = Box::new(Ed25519Generator::default());
        assert!(boxed.generate().is_ok());
    }
}
