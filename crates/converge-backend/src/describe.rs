//! Backend-native remote descriptions.
//!
//! Snapshots of live entities as the control plane reports them. These
//! mirror the desired-state spec types but keep the backend's own
//! conventions:
//! feature switches arrive as a tri-state enum, codecs as typed values,
//! retention as plain milliseconds. Read-only: the reconcilers diff and
//! flatten them, never mutate them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use converge_core::Codec;

/// Tri-state feature switch as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureFlag {
    #[default]
    Unspecified,
    Enabled,
    Disabled,
}

impl FeatureFlag {
    pub fn is_enabled(self) -> bool {
        self == FeatureFlag::Enabled
    }

    pub fn from_bool(enabled: bool) -> Self {
        if enabled { FeatureFlag::Enabled } else { FeatureFlag::Disabled }
    }
}

// ── Tables ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableDescription {
    /// Absolute path of the table.
    pub path: String,
    pub columns: Vec<ColumnDescription>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexDescription>,
    pub ttl: Option<TtlDescription>,
    pub partitioning: PartitioningDescription,
    pub key_bloom_filter: FeatureFlag,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
    pub family: Option<String>,
    pub not_null: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub columns: Vec<String>,
    pub cover: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TtlDescription {
    pub column_name: String,
    pub mode: String,
    pub expire_interval: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitioningDescription {
    pub by_size: FeatureFlag,
    pub by_load: FeatureFlag,
    pub min_partitions_count: u64,
    pub max_partitions_count: u64,
}

// ── Topics ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicDescription {
    /// Topic path relative to the database root.
    pub path: String,
    pub min_active_partitions: u64,
    pub retention_period_ms: u64,
    pub partition_write_speed_bytes_per_second: u64,
    pub partition_write_burst_bytes: u64,
    pub supported_codecs: Vec<Codec>,
    pub consumers: Vec<ConsumerDescription>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerDescription {
    pub name: String,
    pub supported_codecs: Vec<Codec>,
    /// Milliseconds since epoch the consumer reads from.
    pub read_from_ms: u64,
}
