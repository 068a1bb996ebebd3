//! Desired-state builder.
//!
//! Pure functions from flat configuration to fully-typed specs. All
//! shape validation happens here, before any network call: duplicate
//! names, unknown types, out-of-range partition keys and unknown codecs
//! come back as one `ConfigError::Validation` each. Same input, same
//! spec; nothing below reads a clock or the environment.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use converge_core::{
    ALLOWED_CODECS, Codec, ColumnConfig, ConfigError, ConfigResult, DEFAULT_RETENTION_MS,
    DEFAULT_TOPIC_CODECS, Endpoint, EntityId, PartitionKeysConfig, TableConfig, TopicConfig,
};

/// Partition write throughput applied to every topic (bytes/second and
/// burst). The control plane default, not operator-configurable here.
pub const DEFAULT_PARTITION_WRITE_SPEED: u64 = 1 << 20;

// ── Column types and key literals ──────────────────────────────────

/// Primitive column types the reconciler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Utf8,
    Bytes,
    Date,
    Datetime,
    Timestamp,
}

impl ColumnType {
    /// Backend type name.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Bool => "Bool",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::Uint32 => "Uint32",
            ColumnType::Uint64 => "Uint64",
            ColumnType::Float => "Float",
            ColumnType::Double => "Double",
            ColumnType::Utf8 => "Utf8",
            ColumnType::Bytes => "String",
            ColumnType::Date => "Date",
            ColumnType::Datetime => "Datetime",
            ColumnType::Timestamp => "Timestamp",
        }
    }

    pub fn from_name(name: &str) -> Option<ColumnType> {
        match name {
            "Bool" => Some(ColumnType::Bool),
            "Int32" => Some(ColumnType::Int32),
            "Int64" => Some(ColumnType::Int64),
            "Uint32" => Some(ColumnType::Uint32),
            "Uint64" => Some(ColumnType::Uint64),
            "Float" => Some(ColumnType::Float),
            "Double" => Some(ColumnType::Double),
            "Utf8" => Some(ColumnType::Utf8),
            "String" => Some(ColumnType::Bytes),
            "Date" => Some(ColumnType::Date),
            "Datetime" => Some(ColumnType::Datetime),
            "Timestamp" => Some(ColumnType::Timestamp),
            _ => None,
        }
    }
}

/// A typed partition-boundary literal.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    Text(String),
}

/// Parse a split-key literal against the type of its primary-key column.
///
/// Date literals are calendar dates (`YYYY-MM-DD`, stored as days since
/// epoch); Datetime and Timestamp literals are plain integers in the
/// column's native unit. Parse failure is a validation error, never a
/// silent coercion.
pub fn parse_partition_key(literal: &str, ty: ColumnType) -> ConfigResult<KeyValue> {
    let invalid = || {
        ConfigError::validation(format!(
            "partition key {literal:?} is not a valid {} literal",
            ty.name()
        ))
    };
    match ty {
        ColumnType::Bool => literal.parse().map(KeyValue::Bool).map_err(|_| invalid()),
        ColumnType::Int32 | ColumnType::Int64 => {
            literal.parse().map(KeyValue::Int).map_err(|_| invalid())
        }
        ColumnType::Uint32 | ColumnType::Uint64 | ColumnType::Datetime | ColumnType::Timestamp => {
            literal.parse().map(KeyValue::Uint).map_err(|_| invalid())
        }
        ColumnType::Float | ColumnType::Double => {
            literal.parse().map(KeyValue::Double).map_err(|_| invalid())
        }
        ColumnType::Utf8 | ColumnType::Bytes => Ok(KeyValue::Text(literal.to_string())),
        ColumnType::Date => days_since_epoch(literal).map(KeyValue::Uint).ok_or_else(invalid),
    }
}

/// `YYYY-MM-DD` → days since 1970-01-01. Dates before the epoch are not
/// representable in the column's unsigned unit.
fn days_since_epoch(date: &str) -> Option<u64> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    u64::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

// ── Table spec ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
    pub family: Option<String>,
    pub not_null: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    GlobalSync,
    GlobalAsync,
}

#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<String>,
    pub cover: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FamilySpec {
    pub name: String,
    pub data: Option<String>,
    pub compression: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TtlSpec {
    pub column_name: String,
    pub mode: Option<String>,
    pub expire_interval: String,
}

#[derive(Debug, Clone, Default)]
pub struct PartitioningSpec {
    pub uniform_partitions: Option<u64>,
    /// Ordered split points; each inner sequence is a prefix of the
    /// primary-key columns.
    pub partition_at_keys: Vec<Vec<KeyValue>>,
    pub by_size_enabled: Option<bool>,
    pub by_load_enabled: Option<bool>,
    pub min_partitions_count: Option<u64>,
    pub max_partitions_count: Option<u64>,
}

/// Fully-typed desired state for a table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub endpoint: Endpoint,
    /// Path relative to the database root.
    pub path: String,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexSpec>,
    pub families: Vec<FamilySpec>,
    pub ttl: Option<TtlSpec>,
    pub partitioning: PartitioningSpec,
    pub read_replicas_settings: Option<String>,
    pub bloom_filter_enabled: Option<bool>,
    pub attributes: BTreeMap<String, String>,
}

impl TableSpec {
    /// Absolute path under the backend root.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.endpoint.database, self.path)
    }
}

/// Build a [`TableSpec`] from flat configuration. When a persisted
/// identifier exists, its addressing wins over the configured `path`
/// and `database_endpoint`: identity, once assigned, is authoritative;
/// field contents stay configuration-driven.
pub fn expand_table(config: &TableConfig, entity: Option<&EntityId>) -> ConfigResult<TableSpec> {
    let (endpoint, path) = match entity {
        Some(entity) => (entity.endpoint.clone(), entity.entity_path().to_string()),
        None => {
            let path = config.path.trim_matches('/');
            if path.is_empty() {
                return Err(ConfigError::validation("table path is empty"));
            }
            (Endpoint::parse(&config.database_endpoint)?, path.to_string())
        }
    };

    let columns = expand_columns(&config.columns)?;

    let mut family_names = HashSet::new();
    for family in &config.families {
        if !family_names.insert(family.name.as_str()) {
            return Err(ConfigError::validation(format!(
                "duplicate column family {:?}",
                family.name
            )));
        }
    }
    for column in &columns {
        if let Some(family) = &column.family {
            if !family_names.contains(family.as_str()) {
                return Err(ConfigError::validation(format!(
                    "column {:?} references undeclared family {:?}",
                    column.name, family
                )));
            }
        }
    }

    if config.primary_key.is_empty() {
        return Err(ConfigError::validation("primary key must not be empty"));
    }
    let mut pk_columns = Vec::with_capacity(config.primary_key.len());
    for name in &config.primary_key {
        let column = columns
            .iter()
            .find(|c| &c.name == name)
            .ok_or_else(|| {
                ConfigError::validation(format!("primary key column {name:?} is not declared"))
            })?;
        pk_columns.push(column.clone());
    }

    let indexes = expand_indexes(config, &columns)?;

    let ttl = match &config.ttl {
        Some(ttl) => {
            if !columns.iter().any(|c| c.name == ttl.column_name) {
                return Err(ConfigError::validation(format!(
                    "ttl column {:?} is not declared",
                    ttl.column_name
                )));
            }
            Some(TtlSpec {
                column_name: ttl.column_name.clone(),
                mode: ttl.mode.clone(),
                expire_interval: ttl.expire_interval.clone(),
            })
        }
        None => None,
    };

    let partitioning = match &config.partitioning {
        Some(p) => PartitioningSpec {
            uniform_partitions: p.uniform_partitions,
            partition_at_keys: expand_partition_at_keys(&p.partition_at_keys, &pk_columns)?,
            by_size_enabled: p.by_size_enabled,
            by_load_enabled: p.by_load_enabled,
            min_partitions_count: p.min_partitions_count,
            max_partitions_count: p.max_partitions_count,
        },
        None => PartitioningSpec::default(),
    };

    Ok(TableSpec {
        endpoint,
        path,
        columns,
        primary_key: config.primary_key.clone(),
        indexes,
        families: config
            .families
            .iter()
            .map(|f| FamilySpec {
                name: f.name.clone(),
                data: f.data.clone(),
                compression: f.compression.clone(),
            })
            .collect(),
        ttl,
        partitioning,
        read_replicas_settings: config.read_replicas_settings.clone(),
        bloom_filter_enabled: config.primary_key_bloom_filter,
        attributes: config.attributes.clone(),
    })
}

fn expand_columns(configs: &[ColumnConfig]) -> ConfigResult<Vec<ColumnSpec>> {
    if configs.is_empty() {
        return Err(ConfigError::validation("table declares no columns"));
    }
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(configs.len());
    for config in configs {
        if !seen.insert(config.name.as_str()) {
            return Err(ConfigError::validation(format!("duplicate column {:?}", config.name)));
        }
        let ty = ColumnType::from_name(&config.type_name).ok_or_else(|| {
            ConfigError::validation(format!(
                "column {:?} has unknown type {:?}",
                config.name, config.type_name
            ))
        })?;
        columns.push(ColumnSpec {
            name: config.name.clone(),
            ty,
            family: config.family.clone(),
            not_null: config.not_null,
        });
    }
    Ok(columns)
}

fn expand_indexes(config: &TableConfig, columns: &[ColumnSpec]) -> ConfigResult<Vec<IndexSpec>> {
    let declared: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let mut seen = HashSet::new();
    let mut indexes = Vec::with_capacity(config.indexes.len());
    for index in &config.indexes {
        if !seen.insert(index.name.as_str()) {
            return Err(ConfigError::validation(format!("duplicate index {:?}", index.name)));
        }
        if index.columns.is_empty() {
            return Err(ConfigError::validation(format!(
                "index {:?} declares no columns",
                index.name
            )));
        }
        for column in index.columns.iter().chain(index.cover.iter()) {
            if !declared.contains(column.as_str()) {
                return Err(ConfigError::validation(format!(
                    "index {:?} references undeclared column {column:?}",
                    index.name
                )));
            }
        }
        let kind = match index.type_name.as_deref() {
            None | Some("global_sync") => IndexKind::GlobalSync,
            Some("global_async") => IndexKind::GlobalAsync,
            Some(other) => {
                return Err(ConfigError::validation(format!(
                    "index {:?} has unknown type {other:?}",
                    index.name
                )));
            }
        };
        indexes.push(IndexSpec {
            name: index.name.clone(),
            kind,
            columns: index.columns.clone(),
            cover: index.cover.clone(),
        });
    }
    Ok(indexes)
}

/// Walk the configured split-key list. A tuple may constrain a prefix of
/// the primary-key columns; more values than primary-key columns is a
/// validation error, and each literal is parsed against the type of the
/// column at its position.
pub fn expand_partition_at_keys(
    configs: &[PartitionKeysConfig],
    pk_columns: &[ColumnSpec],
) -> ConfigResult<Vec<Vec<KeyValue>>> {
    let mut result = Vec::with_capacity(configs.len());
    for config in configs {
        if config.keys.len() > pk_columns.len() {
            return Err(ConfigError::validation(format!(
                "too many partition keys: {} values for {} primary key columns",
                config.keys.len(),
                pk_columns.len()
            )));
        }
        let mut tuple = Vec::with_capacity(config.keys.len());
        for (literal, column) in config.keys.iter().zip(pk_columns) {
            tuple.push(parse_partition_key(literal, column.ty)?);
        }
        result.push(tuple);
    }
    Ok(result)
}

// ── Topic spec ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConsumerSpec {
    pub name: String,
    pub supported_codecs: Vec<Codec>,
    /// Milliseconds since epoch. Zero means the beginning of retained
    /// history, never "now".
    pub read_from_ms: u64,
}

/// Fully-typed desired state for a topic.
#[derive(Debug, Clone)]
pub struct TopicSpec {
    pub endpoint: Endpoint,
    /// Topic path relative to the database root.
    pub name: String,
    pub min_active_partitions: u64,
    pub retention_period_ms: u64,
    pub supported_codecs: Vec<Codec>,
    pub consumers: Vec<ConsumerSpec>,
}

/// Build a [`TopicSpec`] from flat configuration.
///
/// An omitted topic codec list means the fixed baseline set; an omitted
/// per-consumer list means the full allowed set. The two defaults are
/// deliberately different.
pub fn expand_topic(config: &TopicConfig, entity: Option<&EntityId>) -> ConfigResult<TopicSpec> {
    let name = config.name.trim_matches('/');
    if name.is_empty() {
        return Err(ConfigError::validation("topic name is empty"));
    }
    let endpoint = match entity {
        Some(entity) => entity.endpoint.clone(),
        None => Endpoint::parse(&config.database_endpoint)?,
    };

    let supported_codecs = expand_codecs(
        config.supported_codecs.as_deref(),
        &DEFAULT_TOPIC_CODECS,
    )?;

    let mut seen = HashSet::new();
    let mut consumers = Vec::with_capacity(config.consumers.len());
    for consumer in &config.consumers {
        if consumer.name.is_empty() {
            return Err(ConfigError::validation("consumer name is empty"));
        }
        if !seen.insert(consumer.name.as_str()) {
            return Err(ConfigError::validation(format!(
                "duplicate consumer {:?}",
                consumer.name
            )));
        }
        consumers.push(ConsumerSpec {
            name: consumer.name.clone(),
            supported_codecs: expand_codecs(
                consumer.supported_codecs.as_deref(),
                &ALLOWED_CODECS,
            )?,
            read_from_ms: consumer.starting_message_timestamp_ms.unwrap_or(0),
        });
    }

    Ok(TopicSpec {
        endpoint,
        name: name.to_string(),
        min_active_partitions: config.partitions_count.unwrap_or(1),
        retention_period_ms: config.retention_period_ms.unwrap_or(DEFAULT_RETENTION_MS),
        supported_codecs,
        consumers,
    })
}

/// Parse a codec name list, falling back to `default` when the list is
/// unset or empty.
fn expand_codecs(names: Option<&[String]>, default: &[Codec]) -> ConfigResult<Vec<Codec>> {
    match names {
        None => Ok(default.to_vec()),
        Some([]) => Ok(default.to_vec()),
        Some(names) => names
            .iter()
            .map(|name| {
                Codec::from_name(name)
                    .ok_or_else(|| ConfigError::validation(format!("unknown codec {name:?}")))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{ConsumerConfig, PartitioningConfig};

    fn endpoint() -> String {
        "grpc://localhost:2136/?database=/local".to_string()
    }

    fn base_table() -> TableConfig {
        TableConfig {
            path: "t1".into(),
            database_endpoint: endpoint(),
            columns: vec![
                ColumnConfig {
                    name: "id".into(),
                    type_name: "Int64".into(),
                    not_null: true,
                    ..ColumnConfig::default()
                },
                ColumnConfig {
                    name: "label".into(),
                    type_name: "Utf8".into(),
                    ..ColumnConfig::default()
                },
            ],
            primary_key: vec!["id".into(), "label".into()],
            ..TableConfig::default()
        }
    }

    #[test]
    fn test_expand_table_resolves_path_from_config() {
        let spec = expand_table(&base_table(), None).unwrap();
        assert_eq!(spec.path, "t1");
        assert_eq!(spec.full_path(), "/local/t1");
    }

    #[test]
    fn test_expand_table_prefers_identifier_path() {
        let entity =
            EntityId::decode("grpc://localhost:2136/?database=/local/renamed-long-ago").unwrap();
        let spec = expand_table(&base_table(), Some(&entity)).unwrap();
        assert_eq!(spec.path, "renamed-long-ago");
    }

    #[test]
    fn test_expand_table_rejects_duplicate_columns() {
        let mut config = base_table();
        config.columns.push(config.columns[0].clone());
        let err = expand_table(&config, None).unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_expand_table_rejects_undeclared_primary_key() {
        let mut config = base_table();
        config.primary_key = vec!["missing".into()];
        assert!(expand_table(&config, None).is_err());
    }

    #[test]
    fn test_partition_keys_bound_by_primary_key_width() {
        let mut config = base_table();
        config.partitioning = Some(PartitioningConfig {
            partition_at_keys: vec![PartitionKeysConfig {
                keys: vec!["10".into(), "a".into(), "extra".into()],
            }],
            ..PartitioningConfig::default()
        });
        let err = expand_table(&config, None).unwrap_err();
        assert!(err.to_string().contains("too many partition keys"));

        // A prefix tuple is fine: excess primary-key columns stay
        // unconstrained for that split point.
        config.partitioning = Some(PartitioningConfig {
            partition_at_keys: vec![PartitionKeysConfig { keys: vec!["10".into()] }],
            ..PartitioningConfig::default()
        });
        let spec = expand_table(&config, None).unwrap();
        assert_eq!(spec.partitioning.partition_at_keys, vec![vec![KeyValue::Int(10)]]);
    }

    #[test]
    fn test_partition_key_parsed_by_column_type() {
        assert_eq!(parse_partition_key("42", ColumnType::Int64).unwrap(), KeyValue::Int(42));
        assert_eq!(
            parse_partition_key("abc", ColumnType::Utf8).unwrap(),
            KeyValue::Text("abc".into())
        );
        assert!(parse_partition_key("abc", ColumnType::Int64).is_err());
        assert!(parse_partition_key("-1", ColumnType::Uint64).is_err());
    }

    #[test]
    fn test_partition_key_dates() {
        assert_eq!(
            parse_partition_key("1970-01-01", ColumnType::Date).unwrap(),
            KeyValue::Uint(0)
        );
        assert_eq!(
            parse_partition_key("1970-02-01", ColumnType::Date).unwrap(),
            KeyValue::Uint(31)
        );
        assert_eq!(
            parse_partition_key("2000-01-01", ColumnType::Date).unwrap(),
            KeyValue::Uint(10957)
        );
        assert!(parse_partition_key("2000-13-01", ColumnType::Date).is_err());
        assert!(parse_partition_key("2021-02-30", ColumnType::Date).is_err());
        assert!(parse_partition_key("1969-12-31", ColumnType::Date).is_err());
    }

    fn base_topic() -> TopicConfig {
        TopicConfig {
            name: "events".into(),
            database_endpoint: endpoint(),
            consumers: vec![ConsumerConfig { name: "billing".into(), ..ConsumerConfig::default() }],
            ..TopicConfig::default()
        }
    }

    #[test]
    fn test_topic_codec_defaults_differ_by_level() {
        let spec = expand_topic(&base_topic(), None).unwrap();
        // Topic default is the fixed baseline; consumer default is the
        // full allowed set. They must not be the same set.
        assert_eq!(spec.supported_codecs, DEFAULT_TOPIC_CODECS.to_vec());
        assert_eq!(spec.consumers[0].supported_codecs, ALLOWED_CODECS.to_vec());
        assert_ne!(spec.supported_codecs, spec.consumers[0].supported_codecs);
    }

    #[test]
    fn test_topic_consumer_defaults_to_epoch() {
        let spec = expand_topic(&base_topic(), None).unwrap();
        assert_eq!(spec.consumers[0].read_from_ms, 0);
    }

    #[test]
    fn test_topic_rejects_unknown_codec() {
        let mut config = base_topic();
        config.supported_codecs = Some(vec!["lz4".into()]);
        assert!(expand_topic(&config, None).is_err());
    }

    #[test]
    fn test_topic_rejects_duplicate_consumers() {
        let mut config = base_topic();
        config.consumers.push(config.consumers[0].clone());
        let err = expand_topic(&config, None).unwrap_err();
        assert!(err.to_string().contains("duplicate consumer"));
    }

    #[test]
    fn test_topic_retention_default() {
        let spec = expand_topic(&base_topic(), None).unwrap();
        assert_eq!(spec.retention_period_ms, DEFAULT_RETENTION_MS);
    }
}
