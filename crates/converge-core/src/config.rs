//! Strongly-typed flat configuration.
//!
//! The host describes each entity with one of these structs (toml/json at
//! the outer edge, serde in between). Validation of shapes happens once,
//! in the desired-state builder; nothing here reads fields by name into
//! untyped values.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::ConfigResult;

/// One day, the default retention for a topic that does not set one.
pub const DEFAULT_RETENTION_MS: u64 = 1000 * 60 * 60 * 24;

/// Field keys used by [`PendingChanges`] and the flattener. One constant
/// per field the reconciler branches on, so call sites cannot drift.
pub mod fields {
    pub const PATH: &str = "path";
    pub const NAME: &str = "name";
    pub const COLUMNS: &str = "columns";
    pub const PRIMARY_KEY: &str = "primary_key";
    pub const INDEXES: &str = "indexes";
    pub const TTL: &str = "ttl";
    pub const ATTRIBUTES: &str = "attributes";
    pub const BLOOM_FILTER: &str = "primary_key_bloom_filter";
    pub const UNIFORM_PARTITIONS: &str = "partitioning.uniform_partitions";
    pub const PARTITION_AT_KEYS: &str = "partitioning.partition_at_keys";
    pub const BY_SIZE: &str = "partitioning.by_size_enabled";
    pub const BY_LOAD: &str = "partitioning.by_load_enabled";
    pub const MIN_PARTITIONS: &str = "partitioning.min_partitions_count";
    pub const MAX_PARTITIONS: &str = "partitioning.max_partitions_count";
    pub const PARTITIONS_COUNT: &str = "partitions_count";
    pub const RETENTION: &str = "retention_period_ms";
    pub const SUPPORTED_CODECS: &str = "supported_codecs";
    pub const CONSUMERS: &str = "consumers";
}

// ── Table configuration ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Path relative to the database root. Used for addressing only
    /// until the first create; afterwards the persisted identifier wins.
    pub path: String,
    pub database_endpoint: String,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
    #[serde(default)]
    pub families: Vec<FamilyConfig>,
    #[serde(default)]
    pub ttl: Option<TtlConfig>,
    #[serde(default)]
    pub partitioning: Option<PartitioningConfig>,
    #[serde(default)]
    pub read_replicas_settings: Option<String>,
    #[serde(default)]
    pub primary_key_bloom_filter: Option<bool>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub not_null: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    /// `global_sync` or `global_async`.
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub cover: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub name: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub compression: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtlConfig {
    pub column_name: String,
    #[serde(default)]
    pub mode: Option<String>,
    /// ISO-8601 duration, e.g. `PT24H`.
    pub expire_interval: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitioningConfig {
    #[serde(default)]
    pub uniform_partitions: Option<u64>,
    #[serde(default)]
    pub partition_at_keys: Vec<PartitionKeysConfig>,
    #[serde(default)]
    pub by_size_enabled: Option<bool>,
    #[serde(default)]
    pub by_load_enabled: Option<bool>,
    #[serde(default)]
    pub min_partitions_count: Option<u64>,
    #[serde(default)]
    pub max_partitions_count: Option<u64>,
}

/// One explicit split point: scalar literals matching a prefix of the
/// primary-key columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionKeysConfig {
    pub keys: Vec<String>,
}

// ── Topic configuration ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic path relative to the database root. A rename is not an
    /// in-place alteration: it recreates the entity under a new
    /// identifier.
    pub name: String,
    pub database_endpoint: String,
    #[serde(default)]
    pub partitions_count: Option<u64>,
    #[serde(default)]
    pub retention_period_ms: Option<u64>,
    /// Unset means the baseline default set, not "no codecs".
    #[serde(default)]
    pub supported_codecs: Option<Vec<String>>,
    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,
    /// Unset means the full allowed set, a wider default than the
    /// topic-level one.
    #[serde(default)]
    pub supported_codecs: Option<Vec<String>>,
    /// Unset means epoch: read from the beginning of retained history.
    #[serde(default)]
    pub starting_message_timestamp_ms: Option<u64>,
}

// ── Host-owned resource record ─────────────────────────────────────

/// Fields the host has changed since the last applied cycle. Drives
/// recreate-on-rename and the flattener's pending-write preservation.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges(HashSet<String>);

impl PendingChanges {
    pub fn none() -> Self {
        PendingChanges::default()
    }

    pub fn of(fields: &[&str]) -> Self {
        PendingChanges(fields.iter().map(|f| f.to_string()).collect())
    }

    pub fn mark(&mut self, field: &str) {
        self.0.insert(field.to_string());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// The host's record of one declared entity: persisted identifier plus
/// current configuration. The reconciler mutates this in place: sets the
/// identifier on create, clears it when the remote entity is gone, and
/// refreshes the configuration from the remote description on read.
#[derive(Debug, Clone)]
pub struct Resource<C> {
    pub id: Option<String>,
    pub config: C,
    pub pending: PendingChanges,
}

impl<C> Resource<C> {
    /// A resource that has never been created.
    pub fn new(config: C) -> Self {
        Resource { id: None, config, pending: PendingChanges::none() }
    }

    /// A resource restored from its persisted identifier.
    pub fn existing(id: impl Into<String>, config: C) -> Self {
        Resource { id: Some(id.into()), config, pending: PendingChanges::none() }
    }

    pub fn set_id(&mut self, id: &EntityId) {
        self.id = Some(id.encode());
    }

    /// Mark the resource absent (deleted outside our control).
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// Decode the persisted identifier, if any.
    pub fn entity(&self) -> ConfigResult<Option<EntityId>> {
        match &self.id {
            Some(id) => EntityId::decode(id).map(Some),
            None => Ok(None),
        }
    }
}
