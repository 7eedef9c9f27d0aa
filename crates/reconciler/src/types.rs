//! Core types for the reconciler.

use std::collections::BTreeMap;

use itertools::Itertools;
use peerkeep_core::{ObjectKey, OwnerReference};
use peerkeep_identity::{KeyParsingError, PeerId, PeerIdentity, PrivateKey};
use peerkeep_store::Record;
use serde::{Deserialize, Serialize};

use crate::error::EntryError;

/// Kind recorded in owner references pointing at a cluster.
pub const CLUSTER_KIND: &str = "IpfsCluster";

/// Prefix shared by every object managed for a cluster.
pub const RESOURCE_PREFIX: &str = "ipfs-cluster-";

/// Shared secret of all replicas, written once.
pub const CLUSTER_SECRET_KEY: &str = "CLUSTER_SECRET";

/// Private key of the bootstrap peer, written once.
pub const BOOTSTRAP_PRIVATE_KEY_KEY: &str = "BOOTSTRAP_PEER_PRIV_KEY";

/// Prefix of the per-replica peer id entries.
pub const PEER_ID_PREFIX: &str = "peerID-";

/// Prefix of the per-replica private key entries.
pub const PRIVATE_KEY_PREFIX: &str = "privateKey-";

/// Entry key holding the peer id of replica `index`.
pub fn peer_id_key(index: u32) -> String {
    format!("{PEER_ID_PREFIX}{index}")
}

/// Entry key holding the private key of replica `index`.
pub fn private_key_key(index: u32) -> String {
    format!("{PRIVATE_KEY_PREFIX}{index}")
}

/// Index encoded in a `peerID-<digits>` key.
///
/// Only the canonical decimal form counts: `peerID-01` or `peerID-+1` are
/// stray keys, never an alias of `peerID-1`.
pub fn parse_peer_id_index(key: &str) -> Option<u32> {
    parse_index(key, PEER_ID_PREFIX)
}

fn parse_index(key: &str, prefix: &str) -> Option<u32> {
    let digits = key.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Name of the objects managed for the cluster called `cluster`.
pub fn resource_name(cluster: &str) -> String {
    format!("{RESOURCE_PREFIX}{cluster}")
}

/// Desired state declaration for one cluster.
///
/// Read-only input to the planners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    pub namespace: String,
    /// Unique id of the cluster resource, used for ownership linkage.
    pub uid: String,
    pub replicas: u32,
}

impl ClusterSpec {
    /// Create a new cluster spec.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
        replicas: u32,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: uid.into(),
            replicas,
        }
    }

    /// Key of the cluster resource itself.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Key of the identity store and placeholder managed for this cluster.
    pub fn resource_key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), resource_name(&self.name))
    }

    /// Controller reference linking managed objects back to the cluster.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference::controller(CLUSTER_KIND, self.name.clone(), self.uid.clone())
    }
}

/// One decoded identity of a stored replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub index: u32,
    pub peer_id: PeerId,
    pub private_key: PrivateKey,
}

impl IdentityRecord {
    /// Attach an index to a generated identity.
    pub fn new(index: u32, identity: PeerIdentity) -> Self {
        Self {
            index,
            peer_id: identity.peer_id,
            private_key: identity.private_key,
        }
    }

    /// Stored `(key, value)` entries for this identity.
    pub fn entries(&self) -> [(String, Vec<u8>); 2] {
        [
            (
                peer_id_key(self.index),
                self.peer_id.to_string().into_bytes(),
            ),
            (
                private_key_key(self.index),
                self.private_key.to_base64().as_bytes().to_vec(),
            ),
        ]
    }
}

/// Snapshot of a persisted identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityStore {
    key: ObjectKey,
    entries: BTreeMap<String, Vec<u8>>,
}

impl IdentityStore {
    /// Wrap an entry set found under `key`.
    pub fn new(key: ObjectKey, entries: BTreeMap<String, Vec<u8>>) -> Self {
        Self { key, entries }
    }

    /// Snapshot the data of a stored record.
    pub fn from_record(record: &Record) -> Self {
        Self::new(record.key(), record.data.clone())
    }

    /// Key the store was read from.
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// All entries, reserved and per-replica.
    pub fn entries(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.entries
    }

    /// Consume the snapshot, returning its entries.
    pub fn into_entries(self) -> BTreeMap<String, Vec<u8>> {
        self.entries
    }

    /// Number of allocated identities: the count of `peerID-<digits>` keys.
    pub fn allocated(&self) -> u32 {
        let count = self
            .entries
            .keys()
            .filter(|key| parse_peer_id_index(key).is_some())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Allocated indices in ascending order.
    pub fn indices(&self) -> Vec<u32> {
        self.entries
            .keys()
            .filter_map(|key| parse_peer_id_index(key))
            .sorted_unstable()
            .collect_vec()
    }

    /// Whether the allocated indices are exactly `0..allocated`, each with a
    /// private key beside its peer id and no private key left over.
    pub fn is_dense(&self) -> bool {
        self.first_gap().is_none()
    }

    /// First index breaking density, if any.
    pub(crate) fn first_gap(&self) -> Option<u32> {
        let mut expected = 0u32;
        for index in self.indices() {
            if index != expected || !self.entries.contains_key(&private_key_key(index)) {
                return Some(expected);
            }
            expected = expected.saturating_add(1);
        }
        // A private key past the allocated range would be overwritten by the
        // next allocation.
        self.entries
            .keys()
            .filter_map(|key| parse_index(key, PRIVATE_KEY_PREFIX))
            .filter(|index| *index >= expected)
            .min()
    }

    /// Stored `CLUSTER_SECRET`.
    pub fn cluster_secret(&self) -> Option<&[u8]> {
        self.entries.get(CLUSTER_SECRET_KEY).map(Vec::as_slice)
    }

    /// Stored `BOOTSTRAP_PEER_PRIV_KEY`.
    pub fn bootstrap_private_key(&self) -> Option<&[u8]> {
        self.entries.get(BOOTSTRAP_PRIVATE_KEY_KEY).map(Vec::as_slice)
    }

    /// Raw peer id entry of replica `index`.
    pub fn peer_id(&self, index: u32) -> Option<&[u8]> {
        self.entries.get(&peer_id_key(index)).map(Vec::as_slice)
    }

    /// Raw private key entry of replica `index`.
    pub fn private_key(&self, index: u32) -> Option<&[u8]> {
        self.entries.get(&private_key_key(index)).map(Vec::as_slice)
    }

    /// Decode the identity of replica `index`, checking that the private key
    /// derives the stored peer id.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError`] when an entry is missing, undecodable, or the
    /// two halves disagree.
    pub fn identity(&self, index: u32) -> Result<IdentityRecord, EntryError> {
        let peer_id = decode_entry(&peer_id_key(index), self.peer_id(index), |s| {
            s.parse::<PeerId>().map_err(KeyParsingError::from)
        })?;
        let private_key = decode_entry(&private_key_key(index), self.private_key(index), |s| {
            PrivateKey::from_base64(s)
        })?;
        if private_key.peer_id() != peer_id {
            return Err(EntryError::Mismatch { index });
        }
        Ok(IdentityRecord {
            index,
            peer_id,
            private_key,
        })
    }
}

fn decode_entry<T>(
    key: &str,
    value: Option<&[u8]>,
    parse: impl FnOnce(&str) -> Result<T, KeyParsingError>,
) -> Result<T, EntryError> {
    let value = value.ok_or_else(|| EntryError::Missing {
        key: key.to_string(),
    })?;
    let text = std::str::from_utf8(value).map_err(|_| EntryError::NotUtf8 {
        key: key.to_string(),
    })?;
    parse(text).map_err(|source| EntryError::Invalid {
        key: key.to_string(),
        source,
    })
}
