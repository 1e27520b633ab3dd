//! Object storage abstraction.
//!
//! Durable put/get/list/remove/stat of opaque byte blobs behind one
//! pluggable interface, used to persist and hydrate delta and insert data.
//! Backend selection is configuration-driven; see [`config`].

pub mod config;
pub mod local;
pub mod memory;
pub mod traits;

pub use config::{ObjectStoreConfig, StorageProvider, create_object_store};
pub use local::LocalDiskObjectStore;
pub use memory::MemoryObjectStore;
pub use traits::{KEY_SEPARATOR, ObjectStore};
