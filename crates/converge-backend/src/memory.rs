//! In-memory fake backend.
//!
//! Implements the full [`ConnectionProvider`] boundary over shared
//! in-process state, for tests and CLI dry runs. Faults are reported
//! with the same "does not exist" phrasing the real control plane uses,
//! so the not-found classifier shim is exercised end to end.
//!
//! Scheme statements are interpreted by a deliberately minimal parser
//! that understands exactly the statement shape the reconciler renders
//! (one clause per line). It is a test double, not a YQL engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use converge_core::Endpoint;

use crate::conn::{Connection, ConnectionProvider, TopicClient};
use crate::conn::{TopicAlterOptions, TopicCreateSettings};
use crate::describe::{
    ColumnDescription, ConsumerDescription, FeatureFlag, IndexDescription,
    PartitioningDescription, TableDescription, TopicDescription,
};
use crate::error::{BackendError, BackendResult};

#[derive(Default)]
struct State {
    /// Tables keyed by absolute path.
    tables: HashMap<String, TableDescription>,
    /// Topics keyed by absolute path (`{database}/{topic}`).
    topics: HashMap<String, TopicDescription>,
}

/// Shared fake control plane. `Clone` hands out handles to the same
/// state, so a test can create through one connection and describe
/// through another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Number of live tables (test observability).
    pub async fn table_count(&self) -> usize {
        self.state.lock().await.tables.len()
    }

    /// Number of live topics (test observability).
    pub async fn topic_count(&self) -> usize {
        self.state.lock().await.topics.len()
    }

    /// Whether a topic exists at `{database}/{path}` (test observability).
    pub async fn has_topic(&self, full_path: &str) -> bool {
        self.state.lock().await.topics.contains_key(full_path)
    }
}

#[async_trait]
impl ConnectionProvider for MemoryBackend {
    async fn open(&self, endpoint: &str, _token: &str) -> BackendResult<Box<dyn Connection>> {
        let endpoint = Endpoint::parse(endpoint)
            .map_err(|e| BackendError::Connect(e.to_string()))?;
        debug!(endpoint = %endpoint.connection_string(), "memory backend connection opened");
        let state = self.state.clone();
        Ok(Box::new(MemoryConnection {
            topic: MemoryTopicClient { database: endpoint.database.clone(), state: state.clone() },
            state,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
    topic: MemoryTopicClient,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute_scheme(&self, statement: &str) -> BackendResult<()> {
        let trimmed = statement.trim_start();
        if trimmed.starts_with("CREATE TABLE") {
            let desc = parse_create_table(statement)?;
            let mut state = self.state.lock().await;
            if state.tables.contains_key(&desc.path) {
                return Err(BackendError::Rpc(format!("path '{}' already exists", desc.path)));
            }
            debug!(path = %desc.path, "memory backend table created");
            state.tables.insert(desc.path.clone(), desc);
            Ok(())
        } else if let Some(rest) = trimmed.strip_prefix("DROP TABLE") {
            let path = backticked(rest)
                .ok_or_else(|| BackendError::Rpc("malformed DROP TABLE statement".into()))?;
            let mut state = self.state.lock().await;
            match state.tables.remove(&path) {
                Some(_) => {
                    debug!(%path, "memory backend table dropped");
                    Ok(())
                }
                None => Err(BackendError::Rpc(format!("path '{path}' does not exist"))),
            }
        } else {
            Err(BackendError::Rpc(format!("unsupported scheme statement: {trimmed:.40}")))
        }
    }

    async fn describe_table(&self, path: &str) -> BackendResult<TableDescription> {
        let state = self.state.lock().await;
        state
            .tables
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::Rpc(format!("path '{path}' does not exist")))
    }

    fn topic(&self) -> &dyn TopicClient {
        &self.topic
    }

    async fn close(&self) {}
}

struct MemoryTopicClient {
    database: String,
    state: Arc<Mutex<State>>,
}

impl MemoryTopicClient {
    fn full_path(&self, path: &str) -> String {
        format!("{}/{}", self.database, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl TopicClient for MemoryTopicClient {
    async fn create(&self, path: &str, settings: TopicCreateSettings) -> BackendResult<()> {
        let key = self.full_path(path);
        let mut state = self.state.lock().await;
        if state.topics.contains_key(&key) {
            return Err(BackendError::Rpc(format!("path '{key}' already exists")));
        }
        debug!(path = %key, "memory backend topic created");
        state.topics.insert(
            key,
            TopicDescription {
                path: path.to_string(),
                min_active_partitions: settings.min_active_partitions,
                retention_period_ms: settings.retention_period_ms,
                partition_write_speed_bytes_per_second: settings
                    .partition_write_speed_bytes_per_second,
                partition_write_burst_bytes: settings.partition_write_burst_bytes,
                supported_codecs: settings.supported_codecs,
                consumers: settings
                    .consumers
                    .into_iter()
                    .map(|c| ConsumerDescription {
                        name: c.name,
                        supported_codecs: c.supported_codecs,
                        read_from_ms: c.read_from_ms,
                    })
                    .collect(),
            },
        );
        Ok(())
    }

    async fn describe(&self, path: &str) -> BackendResult<TopicDescription> {
        let key = self.full_path(path);
        let state = self.state.lock().await;
        state
            .topics
            .get(&key)
            .cloned()
            .ok_or_else(|| BackendError::Rpc(format!("path '{key}' does not exist")))
    }

    async fn alter(&self, path: &str, options: TopicAlterOptions) -> BackendResult<()> {
        let key = self.full_path(path);
        let mut state = self.state.lock().await;
        let desc = state
            .topics
            .get_mut(&key)
            .ok_or_else(|| BackendError::Rpc(format!("path '{key}' does not exist")))?;

        if let Some(codecs) = options.set_supported_codecs {
            desc.supported_codecs = codecs;
        }
        if let Some(retention) = options.set_retention_period_ms {
            desc.retention_period_ms = retention;
        }
        if let Some(partitions) = options.set_min_active_partitions {
            desc.min_active_partitions = partitions;
        }
        if let Some(speed) = options.set_partition_write_speed_bytes_per_second {
            desc.partition_write_speed_bytes_per_second = speed;
        }
        if let Some(burst) = options.set_partition_write_burst_bytes {
            desc.partition_write_burst_bytes = burst;
        }
        desc.consumers.retain(|c| !options.drop_consumers.contains(&c.name));
        for consumer in options.alter_consumers {
            if let Some(existing) = desc.consumers.iter_mut().find(|c| c.name == consumer.name) {
                existing.supported_codecs = consumer.supported_codecs;
                existing.read_from_ms = consumer.read_from_ms;
            }
        }
        for consumer in options.add_consumers {
            desc.consumers.push(ConsumerDescription {
                name: consumer.name,
                supported_codecs: consumer.supported_codecs,
                read_from_ms: consumer.read_from_ms,
            });
        }
        debug!(path = %key, "memory backend topic altered");
        Ok(())
    }

    async fn drop(&self, path: &str) -> BackendResult<()> {
        let key = self.full_path(path);
        let mut state = self.state.lock().await;
        match state.topics.remove(&key) {
            Some(_) => {
                debug!(path = %key, "memory backend topic dropped");
                Ok(())
            }
            None => Err(BackendError::Rpc(format!("path '{key}' does not exist"))),
        }
    }
}

// ── Minimal CREATE TABLE interpreter ───────────────────────────────

/// First backticked token in `s`.
fn backticked(s: &str) -> Option<String> {
    let start = s.find('`')? + 1;
    let end = start + s[start..].find('`')?;
    Some(s[start..end].to_string())
}

/// Every backticked token in `s`, in order.
fn all_backticked(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find('`') {
        let tail = &rest[start + 1..];
        let Some(end) = tail.find('`') else { break };
        out.push(tail[..end].to_string());
        rest = &tail[end + 1..];
    }
    out
}

fn parse_create_table(statement: &str) -> BackendResult<TableDescription> {
    let malformed = |what: &str| BackendError::Rpc(format!("malformed CREATE TABLE: {what}"));

    let mut lines = statement.lines();
    let header = lines.next().ok_or_else(|| malformed("empty statement"))?;
    let path = backticked(header).ok_or_else(|| malformed("missing table path"))?;

    let mut desc = TableDescription { path, ..TableDescription::default() };
    let mut in_with = false;
    for line in lines {
        let line = line.trim().trim_end_matches(',');
        if line == ")" || line == "(" || line.is_empty() || line == ");" {
            continue;
        }
        if line.starts_with("WITH") {
            in_with = true;
            continue;
        }
        if in_with {
            parse_with_clause(line, &mut desc);
        } else if let Some(rest) = line.strip_prefix("PRIMARY KEY") {
            desc.primary_key = all_backticked(rest);
        } else if let Some(rest) = line.strip_prefix("INDEX ") {
            parse_index_clause(rest, &mut desc);
        } else if line.starts_with("FAMILY ") {
            // Family storage hints are not part of the description the
            // fake reports back.
        } else if line.starts_with('`') {
            desc.columns.push(parse_column_clause(line)?);
        }
    }
    if desc.columns.is_empty() {
        return Err(malformed("no columns"));
    }
    Ok(desc)
}

fn parse_column_clause(line: &str) -> BackendResult<ColumnDescription> {
    let name = backticked(line)
        .ok_or_else(|| BackendError::Rpc("malformed column clause".into()))?;
    let after_name = &line[line.find('`').unwrap_or(0) + name.len() + 2..];
    let type_name = after_name
        .split_whitespace()
        .next()
        .ok_or_else(|| BackendError::Rpc(format!("column `{name}` has no type")))?
        .to_string();
    let family = after_name
        .split_once("FAMILY")
        .and_then(|(_, fam)| backticked(fam));
    Ok(ColumnDescription {
        name,
        type_name,
        family,
        not_null: after_name.contains("NOT NULL"),
    })
}

fn parse_index_clause(rest: &str, desc: &mut TableDescription) {
    let Some(name) = backticked(rest) else { return };
    let (on_part, cover_part) = match rest.split_once("COVER") {
        Some((on, cover)) => (on, Some(cover)),
        None => (rest, None),
    };
    let columns = match on_part.split_once("ON") {
        Some((_, cols)) => all_backticked(cols),
        None => Vec::new(),
    };
    let cover = cover_part.map(all_backticked).unwrap_or_default();
    desc.indexes.push(IndexDescription { name, columns, cover });
}

fn parse_with_clause(line: &str, desc: &mut TableDescription) {
    let Some((key, value)) = line.split_once('=') else { return };
    let key = key.trim();
    let value = value.trim();
    let enabled = FeatureFlag::from_bool(value == "ENABLED");
    match key {
        "KEY_BLOOM_FILTER" => desc.key_bloom_filter = enabled,
        "AUTO_PARTITIONING_BY_SIZE_ENABLED" => desc.partitioning.by_size = enabled,
        "AUTO_PARTITIONING_BY_LOAD" => desc.partitioning.by_load = enabled,
        "AUTO_PARTITIONING_MIN_PARTITIONS_COUNT" => {
            desc.partitioning.min_partitions_count = value.parse().unwrap_or_default();
        }
        "AUTO_PARTITIONING_MAX_PARTITIONS_COUNT" => {
            desc.partitioning.max_partitions_count = value.parse().unwrap_or_default();
        }
        "TTL" => {
            if let Some(interval) = value.split('"').nth(1) {
                desc.ttl = Some(crate::describe::TtlDescription {
                    column_name: backticked(value).unwrap_or_default(),
                    mode: "since_unix_epoch".into(),
                    expire_interval: interval.to_string(),
                });
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STMT: &str = "CREATE TABLE `/local/t1` (\n    `id` Int64 NOT NULL,\n    `payload` Utf8 FAMILY `hot`,\n    INDEX `by_payload` GLOBAL ON (`payload`) COVER (`id`),\n    PRIMARY KEY (`id`)\n)\nWITH (\n    KEY_BLOOM_FILTER = ENABLED,\n    AUTO_PARTITIONING_MIN_PARTITIONS_COUNT = 2\n)";

    #[test]
    fn test_parse_create_table() {
        let desc = parse_create_table(STMT).unwrap();
        assert_eq!(desc.path, "/local/t1");
        assert_eq!(desc.columns.len(), 2);
        assert_eq!(desc.columns[0].name, "id");
        assert_eq!(desc.columns[0].type_name, "Int64");
        assert!(desc.columns[0].not_null);
        assert_eq!(desc.columns[1].family.as_deref(), Some("hot"));
        assert_eq!(desc.primary_key, vec!["id"]);
        assert_eq!(desc.indexes.len(), 1);
        assert_eq!(desc.indexes[0].columns, vec!["payload"]);
        assert_eq!(desc.indexes[0].cover, vec!["id"]);
        assert!(desc.key_bloom_filter.is_enabled());
        assert_eq!(desc.partitioning.min_partitions_count, 2);
    }

    #[tokio::test]
    async fn test_scheme_create_describe_drop() {
        let backend = MemoryBackend::new();
        let conn = backend
            .open("grpc://localhost:2136/?database=/local", "t")
            .await
            .unwrap();
        conn.execute_scheme(STMT).await.unwrap();
        let desc = conn.describe_table("/local/t1").await.unwrap();
        assert_eq!(desc.primary_key, vec!["id"]);

        conn.execute_scheme("DROP TABLE `/local/t1`;").await.unwrap();
        let err = conn.describe_table("/local/t1").await.unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }

    #[tokio::test]
    async fn test_topic_lifecycle() {
        let backend = MemoryBackend::new();
        let conn = backend
            .open("grpc://localhost:2136/?database=/local", "t")
            .await
            .unwrap();
        conn.topic()
            .create("events", TopicCreateSettings {
                min_active_partitions: 2,
                retention_period_ms: 1000,
                ..TopicCreateSettings::default()
            })
            .await
            .unwrap();

        let desc = conn.topic().describe("events").await.unwrap();
        assert_eq!(desc.min_active_partitions, 2);

        conn.topic()
            .alter("events", TopicAlterOptions {
                set_retention_period_ms: Some(5000),
                ..TopicAlterOptions::default()
            })
            .await
            .unwrap();
        assert_eq!(conn.topic().describe("events").await.unwrap().retention_period_ms, 5000);

        conn.topic().drop("events").await.unwrap();
        let err = conn.topic().describe("events").await.unwrap_err();
        assert!(crate::error::is_not_found(&err));
    }
}
