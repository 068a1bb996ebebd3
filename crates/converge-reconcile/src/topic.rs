//! Topic reconciler.
//!
//! Drives one topic through `Absent -> Creating -> Present ->
//! {Altering | Recreating} -> Present -> Deleting -> Absent`. Each
//! operation is a single pass: open a connection, do the minimal
//! create/alter/drop, close on every exit path, and re-read so the host
//! never sees a stale view.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use converge_backend::{
    Connection, ConnectionProvider, ConsumerDescription, ConsumerSettings, TopicAlterOptions,
    TopicClient, TopicCreateSettings, TopicDescription, is_not_found,
};
use converge_core::config::fields;
use converge_core::{Diagnostic, Diagnostics, EntityId, Resource, TopicConfig};

use crate::expand::{DEFAULT_PARTITION_WRITE_SPEED, TopicSpec, expand_topic};
use crate::flatten::flatten_topic;

/// Reconciles declared topics against the control plane.
pub struct TopicReconciler<P> {
    provider: P,
    token: String,
}

impl<P: ConnectionProvider> TopicReconciler<P> {
    pub fn new(provider: P, token: impl Into<String>) -> Self {
        TopicReconciler { provider, token: token.into() }
    }

    /// Create the declared topic and persist its identifier.
    pub async fn create(&self, res: &mut Resource<TopicConfig>) -> Diagnostics {
        let spec = match expand_topic(&res.config, None) {
            Ok(spec) => spec,
            Err(err) => {
                return Diagnostic::from_error("failed to build topic specification", &err).into();
            }
        };
        let entity = match EntityId::new(spec.endpoint.clone(), &spec.name) {
            Ok(entity) => entity,
            Err(err) => {
                return Diagnostic::from_error("failed to build topic identifier", &err).into();
            }
        };

        let conn = match self.provider.open(&spec.endpoint.connection_string(), &self.token).await
        {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize topic control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.topic().create(&spec.name, create_settings(&spec)).await;
        conn.close().await;

        if let Err(err) = result {
            return Diagnostic::from_error(
                format!("failed to create topic {:?}", spec.name),
                &err,
            )
            .into();
        }
        info!(topic = %spec.name, id = %entity, "topic created");
        res.set_id(&entity);

        // Create never returns a stale view.
        self.read(res).await
    }

    /// Refresh the configuration from the live topic. A topic deleted
    /// outside our control clears the identifier and is not an error.
    pub async fn read(&self, res: &mut Resource<TopicConfig>) -> Diagnostics {
        let entity = match res.entity() {
            Ok(Some(entity)) => entity,
            Ok(None) => return Diagnostics::new(),
            Err(err) => return Diagnostic::from_error("failed to parse topic identifier", &err).into(),
        };

        let conn = match self.provider.open(&entity.prepare_full_endpoint(), &self.token).await {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize topic control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.topic().describe(entity.entity_path()).await;
        conn.close().await;

        match result {
            Err(err) if is_not_found(&err) => {
                // Deleted outside of our control: mark absent.
                debug!(topic = entity.entity_path(), "topic gone from backend, clearing identifier");
                res.clear_id();
                Diagnostics::new()
            }
            Err(err) => Diagnostic::from_error(
                format!("failed to describe topic {:?}", entity.entity_path()),
                &err,
            )
            .into(),
            Ok(desc) => {
                flatten_topic(&desc, &mut res.config, &res.pending);
                Diagnostics::new()
            }
        }
    }

    /// Converge the live topic to the declared configuration.
    ///
    /// A pending rename is a recreate: the new topic is created under a
    /// fresh identifier and the old remote object is left behind. A
    /// topic that vanished externally is self-healed via the create
    /// path. Otherwise a single alter call carries every difference.
    pub async fn update(&self, res: &mut Resource<TopicConfig>) -> Diagnostics {
        if res.pending.has(fields::NAME) {
            info!(topic = %res.config.name, "topic rename requested, recreating under a new identifier");
            return self.create(res).await;
        }

        let entity = match res.entity() {
            Ok(Some(entity)) => entity,
            Ok(None) => return self.create(res).await,
            Err(err) => return Diagnostic::from_error("failed to parse topic identifier", &err).into(),
        };
        let spec = match expand_topic(&res.config, Some(&entity)) {
            Ok(spec) => spec,
            Err(err) => {
                return Diagnostic::from_error("failed to build topic specification", &err).into();
            }
        };

        let conn = match self.provider.open(&entity.prepare_full_endpoint(), &self.token).await {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize topic control plane client",
                    &err,
                )
                .into();
            }
        };
        let described = conn.topic().describe(entity.entity_path()).await;

        let desc = match described {
            Err(err) if is_not_found(&err) => {
                conn.close().await;
                warn!(topic = entity.entity_path(), "topic missing during update, recreating");
                res.clear_id();
                return self.create(res).await;
            }
            Err(err) => {
                conn.close().await;
                return Diagnostic::from_error(
                    format!("failed to describe topic {:?}", entity.entity_path()),
                    &err,
                )
                .into();
            }
            Ok(desc) => desc,
        };

        let options = prepare_alter_options(&spec, &desc);
        let result = if options.is_empty() {
            debug!(topic = entity.entity_path(), "topic already converged");
            Ok(())
        } else {
            conn.topic().alter(entity.entity_path(), options).await
        };
        conn.close().await;

        if let Err(err) = result {
            return Diagnostic::from_error(
                format!("failed to alter topic {:?}", entity.entity_path()),
                &err,
            )
            .into();
        }
        self.read(res).await
    }

    /// Drop the topic. Deleting an already-absent topic succeeds.
    pub async fn delete(&self, res: &mut Resource<TopicConfig>) -> Diagnostics {
        let entity = match res.entity() {
            Ok(Some(entity)) => entity,
            Ok(None) => return Diagnostics::new(),
            Err(err) => return Diagnostic::from_error("failed to parse topic identifier", &err).into(),
        };

        let conn = match self.provider.open(&entity.prepare_full_endpoint(), &self.token).await {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize topic control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.topic().drop(entity.entity_path()).await;
        conn.close().await;

        match result {
            Ok(()) => {
                info!(topic = entity.entity_path(), "topic dropped");
                res.clear_id();
                Diagnostics::new()
            }
            Err(err) if is_not_found(&err) => {
                res.clear_id();
                Diagnostics::new()
            }
            Err(err) => Diagnostic::from_error(
                format!("failed to delete topic {:?}", entity.entity_path()),
                &err,
            )
            .into(),
        }
    }
}

fn create_settings(spec: &TopicSpec) -> TopicCreateSettings {
    TopicCreateSettings {
        min_active_partitions: spec.min_active_partitions,
        retention_period_ms: spec.retention_period_ms,
        partition_write_speed_bytes_per_second: DEFAULT_PARTITION_WRITE_SPEED,
        partition_write_burst_bytes: DEFAULT_PARTITION_WRITE_SPEED,
        supported_codecs: spec.supported_codecs.clone(),
        consumers: spec
            .consumers
            .iter()
            .map(|c| ConsumerSettings {
                name: c.name.clone(),
                supported_codecs: c.supported_codecs.clone(),
                read_from_ms: c.read_from_ms,
            })
            .collect(),
    }
}

/// Compute the option list for one alter call: only the fields where
/// the live description differs from the desired spec. Codec comparison
/// is order-insensitive; consumer convergence adds missing consumers,
/// realigns the attributes of existing ones, and drops undeclared ones.
fn prepare_alter_options(spec: &TopicSpec, desc: &TopicDescription) -> TopicAlterOptions {
    let mut options = TopicAlterOptions::default();

    let desired: HashSet<_> = spec.supported_codecs.iter().copied().collect();
    let live: HashSet<_> = desc.supported_codecs.iter().copied().collect();
    if desired != live {
        options.set_supported_codecs = Some(spec.supported_codecs.clone());
    }
    if spec.retention_period_ms != desc.retention_period_ms {
        options.set_retention_period_ms = Some(spec.retention_period_ms);
    }
    if spec.min_active_partitions != desc.min_active_partitions {
        options.set_min_active_partitions = Some(spec.min_active_partitions);
    }
    if desc.partition_write_speed_bytes_per_second != DEFAULT_PARTITION_WRITE_SPEED {
        options.set_partition_write_speed_bytes_per_second = Some(DEFAULT_PARTITION_WRITE_SPEED);
    }
    if desc.partition_write_burst_bytes != DEFAULT_PARTITION_WRITE_SPEED {
        options.set_partition_write_burst_bytes = Some(DEFAULT_PARTITION_WRITE_SPEED);
    }

    let live_by_name: HashMap<&str, &ConsumerDescription> =
        desc.consumers.iter().map(|c| (c.name.as_str(), c)).collect();
    let desired_names: HashSet<&str> = spec.consumers.iter().map(|c| c.name.as_str()).collect();
    for consumer in &spec.consumers {
        let settings = ConsumerSettings {
            name: consumer.name.clone(),
            supported_codecs: consumer.supported_codecs.clone(),
            read_from_ms: consumer.read_from_ms,
        };
        match live_by_name.get(consumer.name.as_str()) {
            None => options.add_consumers.push(settings),
            Some(current) => {
                let declared: HashSet<_> = consumer.supported_codecs.iter().copied().collect();
                let observed: HashSet<_> = current.supported_codecs.iter().copied().collect();
                if declared != observed || consumer.read_from_ms != current.read_from_ms {
                    options.alter_consumers.push(settings);
                }
            }
        }
    }
    for consumer in &desc.consumers {
        if !desired_names.contains(consumer.name.as_str()) {
            options.drop_consumers.push(consumer.name.clone());
        }
    }

    options
}
