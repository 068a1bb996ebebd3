//! converge-backend: the boundary with the database control plane.
//!
//! Defines the connection-provider traits the reconcilers drive, the
//! backend-native description types they diff against, the not-found
//! classifier shim, and an in-memory fake backend for tests and dry
//! runs. A real network client implements [`ConnectionProvider`]
//! elsewhere; nothing in this workspace performs actual RPCs.

pub mod conn;
pub mod describe;
pub mod error;
pub mod memory;

pub use conn::{
    Connection, ConnectionProvider, ConsumerSettings, TopicAlterOptions, TopicClient,
    TopicCreateSettings,
};
pub use describe::{
    ColumnDescription, ConsumerDescription, FeatureFlag, IndexDescription,
    PartitioningDescription, TableDescription, TopicDescription, TtlDescription,
};
pub use error::{BackendError, BackendResult, is_not_found};
pub use memory::MemoryBackend;
