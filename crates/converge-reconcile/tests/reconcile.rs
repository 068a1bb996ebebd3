//! End-to-end reconcile scenarios over the in-memory backend.

use converge_backend::MemoryBackend;
use converge_core::config::fields;
use converge_core::{ColumnConfig, ConsumerConfig, Resource, TableConfig, TopicConfig};
use converge_reconcile::{TableReconciler, TopicReconciler};

const ENDPOINT: &str = "grpc://localhost:2136/?database=/local";

fn table_config(path: &str) -> TableConfig {
    TableConfig {
        path: path.into(),
        database_endpoint: ENDPOINT.into(),
        columns: vec![ColumnConfig {
            name: "id".into(),
            type_name: "Int64".into(),
            not_null: true,
            ..ColumnConfig::default()
        }],
        primary_key: vec!["id".into()],
        ..TableConfig::default()
    }
}

fn topic_config(name: &str) -> TopicConfig {
    TopicConfig {
        name: name.into(),
        database_endpoint: ENDPOINT.into(),
        partitions_count: Some(2),
        retention_period_ms: Some(60_000),
        consumers: vec![ConsumerConfig { name: "billing".into(), ..ConsumerConfig::default() }],
        ..TopicConfig::default()
    }
}

#[tokio::test]
async fn table_create_read_delete_cycle() {
    let backend = MemoryBackend::new();
    let reconciler = TableReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(table_config("t1"));

    let diags = reconciler.create(&mut res).await;
    assert!(diags.is_empty(), "create reported: {diags:?}");
    assert_eq!(res.id.as_deref(), Some("grpc://localhost:2136/?database=/local/t1"));

    // Read back: one column named id, drift-corrected from the backend.
    res.config.columns.clear();
    let diags = reconciler.read(&mut res).await;
    assert!(diags.is_empty());
    assert_eq!(res.config.columns.len(), 1);
    assert_eq!(res.config.columns[0].name, "id");
    assert_eq!(res.config.primary_key, vec!["id"]);

    let diags = reconciler.delete(&mut res).await;
    assert!(diags.is_empty());
    assert_eq!(backend.table_count().await, 0);

    // Read after delete: absent resource, no diagnostics, cleared id.
    let mut gone = Resource::existing("grpc://localhost:2136/?database=/local/t1", table_config("t1"));
    let diags = reconciler.read(&mut gone).await;
    assert!(diags.is_empty());
    assert!(gone.id.is_none());
}

#[tokio::test]
async fn table_delete_is_idempotent() {
    let backend = MemoryBackend::new();
    let reconciler = TableReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(table_config("t2"));

    assert!(reconciler.create(&mut res).await.is_empty());
    let id = res.id.clone().expect("identifier set on create");

    assert!(reconciler.delete(&mut res).await.is_empty());

    // Second delete observes not-found and still succeeds.
    let mut again = Resource::existing(id, table_config("t2"));
    let diags = reconciler.delete(&mut again).await;
    assert!(diags.is_empty());
    assert!(again.id.is_none());
}

#[tokio::test]
async fn table_update_reports_unapplied_drift() {
    let backend = MemoryBackend::new();
    let reconciler = TableReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(table_config("t3"));
    assert!(reconciler.create(&mut res).await.is_empty());

    // Declare an extra column; tables have no alter path, so the drift
    // comes back as warnings rather than being silently swallowed.
    res.config.columns.push(ColumnConfig {
        name: "extra".into(),
        type_name: "Utf8".into(),
        ..ColumnConfig::default()
    });
    res.pending.mark(fields::COLUMNS);
    let diags = reconciler.update(&mut res).await;
    assert!(!diags.is_empty());
    assert!(!diags.has_errors());
    // The pending declaration survives the read-back flatten.
    assert_eq!(res.config.columns.len(), 2);
}

#[tokio::test]
async fn table_update_recreates_externally_deleted_table() {
    let backend = MemoryBackend::new();
    let reconciler = TableReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(table_config("t4"));
    assert!(reconciler.create(&mut res).await.is_empty());

    // Simulate deletion outside our control.
    let mut zap = Resource::existing(res.id.clone().unwrap(), table_config("t4"));
    assert!(reconciler.delete(&mut zap).await.is_empty());
    assert_eq!(backend.table_count().await, 0);

    let diags = reconciler.update(&mut res).await;
    assert!(!diags.has_errors(), "self-heal reported: {diags:?}");
    assert_eq!(backend.table_count().await, 1);
    assert!(res.id.is_some());
}

#[tokio::test]
async fn topic_create_read_delete_cycle() {
    let backend = MemoryBackend::new();
    let reconciler = TopicReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(topic_config("events"));

    let diags = reconciler.create(&mut res).await;
    assert!(diags.is_empty(), "create reported: {diags:?}");
    assert_eq!(res.id.as_deref(), Some("grpc://localhost:2136/?database=/local/events"));

    // Defaults materialize on read-back: baseline topic codecs, full
    // allowed set for the consumer, epoch start.
    assert_eq!(res.config.supported_codecs, Some(vec!["raw".into(), "gzip".into()]));
    assert_eq!(
        res.config.consumers[0].supported_codecs,
        Some(vec!["raw".into(), "gzip".into(), "zstd".into()])
    );
    assert_eq!(res.config.consumers[0].starting_message_timestamp_ms, Some(0));

    assert!(reconciler.delete(&mut res).await.is_empty());
    assert!(res.id.is_none());
    assert_eq!(backend.topic_count().await, 0);
}

#[tokio::test]
async fn topic_rename_recreates_under_new_identifier() {
    let backend = MemoryBackend::new();
    let reconciler = TopicReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(topic_config("events"));
    assert!(reconciler.create(&mut res).await.is_empty());
    let old_id = res.id.clone().unwrap();

    res.config.name = "events-v2".into();
    res.pending.mark(fields::NAME);
    let diags = reconciler.update(&mut res).await;
    assert!(!diags.has_errors(), "rename reported: {diags:?}");

    let new_id = res.id.clone().unwrap();
    assert_ne!(new_id, old_id);
    assert!(new_id.ends_with("/events-v2"));
    // The old topic is left behind by design.
    assert!(backend.has_topic("/local/events").await);
    assert!(backend.has_topic("/local/events-v2").await);
}

#[tokio::test]
async fn topic_update_alters_in_place() {
    let backend = MemoryBackend::new();
    let reconciler = TopicReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(topic_config("events"));
    assert!(reconciler.create(&mut res).await.is_empty());
    let id = res.id.clone().unwrap();

    res.config.retention_period_ms = Some(120_000);
    res.config.consumers.push(ConsumerConfig { name: "audit".into(), ..ConsumerConfig::default() });
    let diags = reconciler.update(&mut res).await;
    assert!(diags.is_empty(), "update reported: {diags:?}");

    // Same identifier, altered in place, read-back reflects the change.
    assert_eq!(res.id.as_deref(), Some(id.as_str()));
    assert_eq!(res.config.retention_period_ms, Some(120_000));
    assert_eq!(res.config.consumers.len(), 2);
    assert_eq!(backend.topic_count().await, 1);
}

#[tokio::test]
async fn topic_update_realigns_existing_consumer_attributes() {
    let backend = MemoryBackend::new();
    let reconciler = TopicReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(topic_config("events"));
    assert!(reconciler.create(&mut res).await.is_empty());
    // The consumer was created with the full allowed codec set.
    assert_eq!(
        res.config.consumers[0].supported_codecs,
        Some(vec!["raw".into(), "gzip".into(), "zstd".into()])
    );

    res.config.consumers[0].supported_codecs = Some(vec!["raw".into()]);
    let diags = reconciler.update(&mut res).await;
    assert!(diags.is_empty(), "update reported: {diags:?}");

    // The narrowed list reached the backend: the read-back reflects it
    // instead of reverting to the wider live set.
    assert_eq!(res.config.consumers[0].supported_codecs, Some(vec!["raw".into()]));
}

#[tokio::test]
async fn topic_update_self_heals_after_external_delete() {
    let backend = MemoryBackend::new();
    let reconciler = TopicReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(topic_config("events"));
    assert!(reconciler.create(&mut res).await.is_empty());

    let mut zap = Resource::existing(res.id.clone().unwrap(), topic_config("events"));
    assert!(reconciler.delete(&mut zap).await.is_empty());
    assert_eq!(backend.topic_count().await, 0);

    let diags = reconciler.update(&mut res).await;
    assert!(!diags.has_errors(), "self-heal reported: {diags:?}");
    assert_eq!(backend.topic_count().await, 1);
    assert!(res.id.is_some());
}

#[tokio::test]
async fn topic_delete_is_idempotent() {
    let backend = MemoryBackend::new();
    let reconciler = TopicReconciler::new(backend.clone(), "token");
    let mut res = Resource::new(topic_config("events"));
    assert!(reconciler.create(&mut res).await.is_empty());
    let id = res.id.clone().unwrap();

    assert!(reconciler.delete(&mut res).await.is_empty());
    let mut again = Resource::existing(id, topic_config("events"));
    assert!(reconciler.delete(&mut again).await.is_empty());
}

#[tokio::test]
async fn invalid_configuration_fails_before_any_network_call() {
    // A provider that refuses every open proves validation happens first.
    let backend = MemoryBackend::new();
    let reconciler = TableReconciler::new(backend.clone(), "token");

    let mut config = table_config("bad");
    config.primary_key = vec!["missing".into()];
    let mut res = Resource::new(config);
    let diags = reconciler.create(&mut res).await;
    assert!(diags.has_errors());
    assert!(res.id.is_none());
    assert_eq!(backend.table_count().await, 0);
}
