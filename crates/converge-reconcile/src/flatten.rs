//! State flattener.
//!
//! Folds a just-read remote description back into the host's flat
//! configuration. For fields the host has a pending change on, the
//! local value wins; a just-issued alter may not be reflected in the
//! read yet. Everything else is overwritten from the remote description
//! (drift correction).
//!
//! Explicit split keys and uniform partition counts are create-time
//! settings the backend never reports back; they always keep their
//! local value.

use converge_backend::{TableDescription, TopicDescription};
use converge_core::config::fields;
use converge_core::{
    ColumnConfig, ConsumerConfig, IndexConfig, PartitioningConfig, PendingChanges, TableConfig,
    TopicConfig, TtlConfig,
};

/// Refresh a table configuration from its remote description.
pub fn flatten_table(desc: &TableDescription, config: &mut TableConfig, pending: &PendingChanges) {
    if !pending.has(fields::COLUMNS) {
        config.columns = desc
            .columns
            .iter()
            .map(|c| ColumnConfig {
                name: c.name.clone(),
                type_name: c.type_name.clone(),
                family: c.family.clone(),
                not_null: c.not_null,
            })
            .collect();
    }
    if !pending.has(fields::PRIMARY_KEY) {
        config.primary_key = desc.primary_key.clone();
    }
    if !pending.has(fields::INDEXES) {
        config.indexes = desc
            .indexes
            .iter()
            .map(|i| IndexConfig {
                name: i.name.clone(),
                type_name: None,
                columns: i.columns.clone(),
                cover: i.cover.clone(),
            })
            .collect();
    }
    if !pending.has(fields::TTL) {
        config.ttl = desc.ttl.as_ref().map(|ttl| TtlConfig {
            column_name: ttl.column_name.clone(),
            mode: Some(ttl.mode.clone()),
            expire_interval: ttl.expire_interval.clone(),
        });
    }
    if !pending.has(fields::ATTRIBUTES) {
        config.attributes = desc.attributes.clone();
    }
    if !pending.has(fields::BLOOM_FILTER) {
        config.primary_key_bloom_filter = Some(desc.key_bloom_filter.is_enabled());
    }

    let partitioning = config.partitioning.get_or_insert_with(PartitioningConfig::default);
    if !pending.has(fields::BY_SIZE) {
        partitioning.by_size_enabled = Some(desc.partitioning.by_size.is_enabled());
    }
    if !pending.has(fields::BY_LOAD) {
        partitioning.by_load_enabled = Some(desc.partitioning.by_load.is_enabled());
    }
    if !pending.has(fields::MIN_PARTITIONS) {
        partitioning.min_partitions_count = Some(desc.partitioning.min_partitions_count);
    }
    if !pending.has(fields::MAX_PARTITIONS) {
        partitioning.max_partitions_count = Some(desc.partitioning.max_partitions_count);
    }
    // uniform_partitions and partition_at_keys stay local on purpose.
}

/// Refresh a topic configuration from its remote description.
pub fn flatten_topic(desc: &TopicDescription, config: &mut TopicConfig, pending: &PendingChanges) {
    if !pending.has(fields::NAME) {
        config.name = desc.path.clone();
    }
    if !pending.has(fields::PARTITIONS_COUNT) {
        config.partitions_count = Some(desc.min_active_partitions);
    }
    if !pending.has(fields::RETENTION) {
        config.retention_period_ms = Some(desc.retention_period_ms);
    }
    if !pending.has(fields::SUPPORTED_CODECS) {
        config.supported_codecs =
            Some(desc.supported_codecs.iter().map(|c| c.name().to_string()).collect());
    }
    if !pending.has(fields::CONSUMERS) {
        config.consumers = desc
            .consumers
            .iter()
            .map(|c| ConsumerConfig {
                name: c.name.clone(),
                supported_codecs: Some(
                    c.supported_codecs.iter().map(|c| c.name().to_string()).collect(),
                ),
                starting_message_timestamp_ms: Some(c.read_from_ms),
            })
            .collect();
    }
}
