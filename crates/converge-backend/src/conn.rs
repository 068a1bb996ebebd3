//! Connection-provider trait boundary.
//!
//! The reconcilers drive these traits; a concrete client (or the
//! in-memory fake) implements them. One [`Connection`] is scoped to a
//! single reconcile call: acquired at entry, closed on every exit path.

use async_trait::async_trait;

use converge_core::Codec;

use crate::describe::{TableDescription, TopicDescription};
use crate::error::BackendResult;

/// Desired settings for a typed topic create call.
#[derive(Debug, Clone, Default)]
pub struct TopicCreateSettings {
    pub min_active_partitions: u64,
    pub retention_period_ms: u64,
    pub partition_write_speed_bytes_per_second: u64,
    pub partition_write_burst_bytes: u64,
    pub supported_codecs: Vec<Codec>,
    pub consumers: Vec<ConsumerSettings>,
}

#[derive(Debug, Clone, Default)]
pub struct ConsumerSettings {
    pub name: String,
    pub supported_codecs: Vec<Codec>,
    pub read_from_ms: u64,
}

/// Option list for a single topic alter call. `None`/empty fields are
/// left untouched by the backend.
#[derive(Debug, Clone, Default)]
pub struct TopicAlterOptions {
    pub set_supported_codecs: Option<Vec<Codec>>,
    pub set_retention_period_ms: Option<u64>,
    pub set_min_active_partitions: Option<u64>,
    pub set_partition_write_speed_bytes_per_second: Option<u64>,
    pub set_partition_write_burst_bytes: Option<u64>,
    pub add_consumers: Vec<ConsumerSettings>,
    /// Replace the attributes of existing consumers, matched by name.
    pub alter_consumers: Vec<ConsumerSettings>,
    pub drop_consumers: Vec<String>,
}

impl TopicAlterOptions {
    /// True when the alter call would change nothing.
    pub fn is_empty(&self) -> bool {
        self.set_supported_codecs.is_none()
            && self.set_retention_period_ms.is_none()
            && self.set_min_active_partitions.is_none()
            && self.set_partition_write_speed_bytes_per_second.is_none()
            && self.set_partition_write_burst_bytes.is_none()
            && self.add_consumers.is_empty()
            && self.alter_consumers.is_empty()
            && self.drop_consumers.is_empty()
    }
}

/// Topic control-plane operations. Paths are relative to the database
/// root of the connection that produced this client.
#[async_trait]
pub trait TopicClient: Send + Sync {
    async fn create(&self, path: &str, settings: TopicCreateSettings) -> BackendResult<()>;
    async fn describe(&self, path: &str) -> BackendResult<TopicDescription>;
    async fn alter(&self, path: &str, options: TopicAlterOptions) -> BackendResult<()>;
    async fn drop(&self, path: &str) -> BackendResult<()>;
}

/// One open control-plane session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a scheme statement (CREATE TABLE / DROP TABLE).
    async fn execute_scheme(&self, statement: &str) -> BackendResult<()>;

    /// Describe a table by absolute path.
    async fn describe_table(&self, path: &str) -> BackendResult<TableDescription>;

    /// The topic client bound to this connection's database.
    fn topic(&self) -> &dyn TopicClient;

    /// Release the session. Must not fail; called on every exit path.
    async fn close(&self);
}

/// Opens connections against a database endpoint with a credential
/// token. Credential acquisition itself happens outside this crate.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn open(&self, endpoint: &str, token: &str) -> BackendResult<Box<dyn Connection>>;
}
