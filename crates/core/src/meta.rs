//! Object identity and ownership metadata shared by the store and reconcilers.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};

/// Maximum length of an object name or namespace.
pub const MAX_NAME_LEN: usize = 253;

/// Name and namespace addressing a single stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a new object key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Check that both parts are lowercase DNS subdomain names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for the first part that does not validate.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.namespace)?;
        validate_name(&self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Validate a name against the DNS subdomain rules used for stored objects.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] describing the violated rule.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_name(name, "must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_name(
            name,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(Error::invalid_name(
            name,
            format!("contains invalid character '{bad}'"),
        ));
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.starts_with(alnum) || !name.ends_with(alnum) {
        return Err(Error::invalid_name(
            name,
            "must start and end with an alphanumeric character",
        ));
    }
    Ok(())
}

/// Reference from an owned object back to the resource that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: String,
    /// Whether the owner is the managing controller of the object.
    #[serde(default)]
    pub controller: bool,
}

impl OwnerReference {
    /// Create a controller owner reference.
    pub fn controller(kind: impl Into<String>, name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            uid: uid.into(),
            controller: true,
        }
    }
}

/// Errors linking an object to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipError {
    #[error("owner {kind}/{name} has no uid")]
    MissingUid { kind: String, name: String },

    #[error("object is already controlled by {kind}/{name}")]
    AlreadyOwned { kind: String, name: String },

    #[error("owner in namespace '{owner_namespace}' cannot own object in namespace '{object_namespace}'")]
    CrossNamespace {
        owner_namespace: String,
        object_namespace: String,
    },
}

/// Metadata carried by every stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Version stamp assigned by the store on every write; zero before creation.
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    /// Metadata for an object that has not been persisted yet.
    pub fn new(key: &ObjectKey) -> Self {
        Self {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            owner_references: Vec::new(),
            resource_version: 0,
        }
    }

    /// The key addressing this object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// The controlling owner, if any.
    pub fn controller(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Make `owner` the controller of this object.
    ///
    /// An existing controller reference with the same uid is replaced, so
    /// linking is idempotent.
    ///
    /// # Errors
    ///
    /// Fails when the owner has no uid, lives in a different namespace, or
    /// when another owner already controls the object.
    pub fn set_controller_reference(
        &mut self,
        owner: &OwnerReference,
        owner_namespace: &str,
    ) -> std::result::Result<(), OwnershipError> {
        if owner.uid.is_empty() {
            return Err(OwnershipError::MissingUid {
                kind: owner.kind.clone(),
                name: owner.name.clone(),
            });
        }
        if owner_namespace != self.namespace {
            return Err(OwnershipError::CrossNamespace {
                owner_namespace: owner_namespace.to_string(),
                object_namespace: self.namespace.clone(),
            });
        }
        if let Some(existing) = self.controller() {
            if existing.uid != owner.uid {
                return Err(OwnershipError::AlreadyOwned {
                    kind: existing.kind.clone(),
                    name: existing.name.clone(),
                });
            }
        }

        let reference = OwnerReference {
            controller: true,
            ..owner.clone()
        };
        match self.owner_references.iter_mut().find(|r| r.uid == owner.uid) {
            Some(slot) => *slot = reference,
            None => self.owner_references.push(reference),
        }
        Ok(())
    }
}
