//! Named object store used to persist identity secrets.
//!
//! Objects are addressed by kind plus `(namespace, name)` and carry a flat
//! `String -> bytes` mapping. Two backends are provided:
//!
//! - [`InMemoryStore`] - for tests and embedding
//! - [`FileStore`] - one JSON document per object on local disk
//!
//! [`create_or_update`] implements the find-or-create-then-patch protocol
//! controllers use to apply their planned changes.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod file;
pub mod memory;
pub mod ops;
pub mod record;
pub mod store;

pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use ops::{OperationResult, create_or_update};
pub use record::{Kind, Record};
pub use store::{Store, TracingStore, get_cancellable};
