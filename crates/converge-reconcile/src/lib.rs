//! converge-reconcile: the declarative resource reconciler.
//!
//! One reconcile cycle: the builder in [`expand`] turns flat
//! configuration into a typed desired-state spec, the reconciler
//! ([`table`], [`topic`]) fetches the live description over the backend
//! boundary, decides between create, alter, recreate, delete, or
//! nothing, issues the operations, and the [`flatten`] pass refreshes
//! the host-visible configuration from the re-read remote state.
//!
//! The reconciler keeps no state across cycles; everything durable
//! lives in the persisted entity identifier and the backend itself.

pub mod expand;
pub mod flatten;
pub mod statement;
pub mod table;
pub mod topic;

pub use expand::{ColumnType, KeyValue, TableSpec, TopicSpec, expand_table, expand_topic};
pub use table::TableReconciler;
pub use topic::TopicReconciler;
