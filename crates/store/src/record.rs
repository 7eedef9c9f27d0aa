//! Stored objects.

use std::collections::BTreeMap;
use std::fmt;

use peerkeep_core::{ObjectKey, ObjectMeta};
use serde::{Deserialize, Serialize};

/// Kinds of objects the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Flat key to bytes mapping holding secret material.
    Secret,
    /// Data-less identity placeholder.
    ServiceAccount,
}

impl Kind {
    /// Lowercase name, also used as the on-disk directory name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::ServiceAccount => "serviceaccount",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored object: metadata plus a flat byte-valued mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub kind: Kind,
    pub meta: ObjectMeta,
    #[serde(default, with = "base64_data", skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Record {
    /// An empty, not yet persisted record.
    pub fn new(kind: Kind, key: &ObjectKey) -> Self {
        Self {
            kind,
            meta: ObjectMeta::new(key),
            data: BTreeMap::new(),
        }
    }

    /// The key addressing this record.
    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }
}

/// Serde adapter writing byte values as base64 strings.
mod base64_data {
    use std::collections::BTreeMap;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S>(data: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(data.len()))?;
        for (key, value) in data {
            map.serialize_entry(key, &STANDARD.encode(value))?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(key, value)| {
                STANDARD
                    .decode(value)
                    .map(|bytes| (key, bytes))
                    .map_err(de::Error::custom)
            })
            .collect()
    }
}
