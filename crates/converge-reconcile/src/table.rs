//! Table reconciler.
//!
//! Tables are created with a single scheme statement and dropped with
//! another. There is no in-place alter path: drift between the declared
//! configuration and the live description is reported as warnings, one
//! per field, and left unapplied.

use tracing::{debug, info, warn};

use converge_backend::{Connection, ConnectionProvider, TableDescription, is_not_found};
use converge_core::{Diagnostic, Diagnostics, EntityId, Resource, TableConfig};

use crate::expand::{TableSpec, expand_table};
use crate::flatten::flatten_table;
use crate::statement;

/// Reconciles declared tables against the control plane.
pub struct TableReconciler<P> {
    provider: P,
    token: String,
}

impl<P: ConnectionProvider> TableReconciler<P> {
    pub fn new(provider: P, token: impl Into<String>) -> Self {
        TableReconciler { provider, token: token.into() }
    }

    /// Create the declared table and persist its identifier.
    pub async fn create(&self, res: &mut Resource<TableConfig>) -> Diagnostics {
        let spec = match expand_table(&res.config, None) {
            Ok(spec) => spec,
            Err(err) => {
                return Diagnostic::from_error("failed to build table specification", &err).into();
            }
        };
        let entity = match EntityId::new(spec.endpoint.clone(), &spec.path) {
            Ok(entity) => entity,
            Err(err) => {
                return Diagnostic::from_error("failed to build table identifier", &err).into();
            }
        };

        let conn = match self.provider.open(&spec.endpoint.connection_string(), &self.token).await
        {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize table control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.execute_scheme(&statement::create_table(&spec)).await;
        conn.close().await;

        if let Err(err) = result {
            return Diagnostic::from_error(
                format!("failed to create table {:?}", spec.full_path()),
                &err,
            )
            .into();
        }
        info!(table = %spec.full_path(), id = %entity, "table created");
        res.set_id(&entity);

        // Create never returns a stale view.
        self.read(res).await
    }

    /// Refresh the configuration from the live table. A table deleted
    /// outside our control clears the identifier and is not an error.
    pub async fn read(&self, res: &mut Resource<TableConfig>) -> Diagnostics {
        let entity = match res.entity() {
            Ok(Some(entity)) => entity,
            Ok(None) => return Diagnostics::new(),
            Err(err) => return Diagnostic::from_error("failed to parse table identifier", &err).into(),
        };

        let conn = match self.provider.open(&entity.prepare_full_endpoint(), &self.token).await {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize table control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.describe_table(&entity.full_path()).await;
        conn.close().await;

        match result {
            Err(err) if is_not_found(&err) => {
                debug!(table = %entity.full_path(), "table gone from backend, clearing identifier");
                res.clear_id();
                Diagnostics::new()
            }
            Err(err) => Diagnostic::from_error(
                format!("failed to describe table {:?}", entity.full_path()),
                &err,
            )
            .into(),
            Ok(desc) => {
                flatten_table(&desc, &mut res.config, &res.pending);
                Diagnostics::new()
            }
        }
    }

    /// Converge toward the declared configuration as far as tables
    /// allow: a table that vanished externally is recreated; anything
    /// else is reported as unapplied drift, never silently ignored.
    pub async fn update(&self, res: &mut Resource<TableConfig>) -> Diagnostics {
        let entity = match res.entity() {
            Ok(Some(entity)) => entity,
            Ok(None) => return self.create(res).await,
            Err(err) => return Diagnostic::from_error("failed to parse table identifier", &err).into(),
        };
        let spec = match expand_table(&res.config, Some(&entity)) {
            Ok(spec) => spec,
            Err(err) => {
                return Diagnostic::from_error("failed to build table specification", &err).into();
            }
        };

        let conn = match self.provider.open(&entity.prepare_full_endpoint(), &self.token).await {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize table control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.describe_table(&entity.full_path()).await;
        conn.close().await;

        match result {
            Err(err) if is_not_found(&err) => {
                warn!(table = %entity.full_path(), "table missing during update, recreating");
                res.clear_id();
                self.create(res).await
            }
            Err(err) => Diagnostic::from_error(
                format!("failed to describe table {:?}", entity.full_path()),
                &err,
            )
            .into(),
            Ok(desc) => {
                let diags = drift_warnings(&spec, &desc);
                flatten_table(&desc, &mut res.config, &res.pending);
                diags
            }
        }
    }

    /// Drop the table. Deleting an already-absent table succeeds.
    pub async fn delete(&self, res: &mut Resource<TableConfig>) -> Diagnostics {
        let entity = match res.entity() {
            Ok(Some(entity)) => entity,
            Ok(None) => return Diagnostics::new(),
            Err(err) => return Diagnostic::from_error("failed to parse table identifier", &err).into(),
        };

        let conn = match self.provider.open(&entity.prepare_full_endpoint(), &self.token).await {
            Ok(conn) => conn,
            Err(err) => {
                return Diagnostic::from_error(
                    "failed to initialize table control plane client",
                    &err,
                )
                .into();
            }
        };
        let result = conn.execute_scheme(&statement::drop_table(&entity.full_path())).await;
        conn.close().await;

        match result {
            Ok(()) => {
                info!(table = %entity.full_path(), "table dropped");
                res.clear_id();
                Diagnostics::new()
            }
            Err(err) if is_not_found(&err) => {
                res.clear_id();
                Diagnostics::new()
            }
            Err(err) => Diagnostic::from_error(
                format!("failed to delete table {:?}", entity.full_path()),
                &err,
            )
            .into(),
        }
    }
}

/// One warning per field that differs from the live description and has
/// no alter path.
fn drift_warnings(spec: &TableSpec, desc: &TableDescription) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let mut report = |field: &str, detail: String| {
        diags.push(Diagnostic::warning(
            format!("table alter is not supported, no changes applied to {field}"),
            detail,
        ));
    };

    if spec.primary_key != desc.primary_key {
        report(
            "primary_key",
            format!(
                "primary key is immutable after creation (declared {:?}, live {:?})",
                spec.primary_key, desc.primary_key
            ),
        );
    }

    let declared: Vec<(&str, &str)> =
        spec.columns.iter().map(|c| (c.name.as_str(), c.ty.name())).collect();
    let live: Vec<(&str, &str)> =
        desc.columns.iter().map(|c| (c.name.as_str(), c.type_name.as_str())).collect();
    if declared != live {
        report("columns", format!("declared {declared:?}, live {live:?}"));
    }

    let declared_indexes: Vec<&str> = spec.indexes.iter().map(|i| i.name.as_str()).collect();
    let live_indexes: Vec<&str> = desc.indexes.iter().map(|i| i.name.as_str()).collect();
    if declared_indexes != live_indexes {
        report("indexes", format!("declared {declared_indexes:?}, live {live_indexes:?}"));
    }

    let declared_ttl = spec.ttl.as_ref().map(|t| t.column_name.as_str());
    let live_ttl = desc.ttl.as_ref().map(|t| t.column_name.as_str());
    if declared_ttl != live_ttl {
        report("ttl", format!("declared {declared_ttl:?}, live {live_ttl:?}"));
    }

    if let Some(enabled) = spec.bloom_filter_enabled {
        if enabled != desc.key_bloom_filter.is_enabled() {
            report(
                "primary_key_bloom_filter",
                format!("declared {enabled}, live {}", desc.key_bloom_filter.is_enabled()),
            );
        }
    }

    if let Some(min) = spec.partitioning.min_partitions_count {
        if min != desc.partitioning.min_partitions_count {
            report(
                "partitioning.min_partitions_count",
                format!("declared {min}, live {}", desc.partitioning.min_partitions_count),
            );
        }
    }
    if let Some(max) = spec.partitioning.max_partitions_count {
        if max != desc.partitioning.max_partitions_count {
            report(
                "partitioning.max_partitions_count",
                format!("declared {max}, live {}", desc.partitioning.max_partitions_count),
            );
        }
    }

    if spec.attributes != desc.attributes {
        report("attributes", format!("declared {:?}, live {:?}", spec.attributes, desc.attributes));
    }

    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_backend::ColumnDescription;
    use converge_core::ColumnConfig;

    fn spec_and_matching_desc() -> (TableSpec, TableDescription) {
        let config = TableConfig {
            path: "t1".into(),
            database_endpoint: "grpc://localhost:2136/?database=/local".into(),
            columns: vec![ColumnConfig {
                name: "id".into(),
                type_name: "Int64".into(),
                not_null: true,
                ..ColumnConfig::default()
            }],
            primary_key: vec!["id".into()],
            ..TableConfig::default()
        };
        let spec = expand_table(&config, None).unwrap();
        let desc = TableDescription {
            path: "/local/t1".into(),
            columns: vec![ColumnDescription {
                name: "id".into(),
                type_name: "Int64".into(),
                family: None,
                not_null: true,
            }],
            primary_key: vec!["id".into()],
            ..TableDescription::default()
        };
        (spec, desc)
    }

    #[test]
    fn test_no_drift_no_warnings() {
        let (spec, desc) = spec_and_matching_desc();
        assert!(drift_warnings(&spec, &desc).is_empty());
    }

    #[test]
    fn test_drift_is_reported_not_applied() {
        let (spec, mut desc) = spec_and_matching_desc();
        desc.columns.push(ColumnDescription {
            name: "legacy".into(),
            type_name: "Utf8".into(),
            family: None,
            not_null: false,
        });
        desc.primary_key = vec!["id".into(), "legacy".into()];
        let diags = drift_warnings(&spec, &desc);
        assert!(!diags.is_empty());
        assert!(!diags.has_errors());
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.clone()).collect();
        assert!(summaries.iter().any(|s| s.contains("primary_key")));
        assert!(summaries.iter().any(|s| s.contains("columns")));
    }
}
