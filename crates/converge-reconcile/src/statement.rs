//! Scheme-statement rendering.
//!
//! Turns a [`TableSpec`] into the single `CREATE TABLE` statement the
//! backend executes, one clause per line. Identifiers are backtick
//! quoted; string literals double-quoted with escaping.

use crate::expand::{IndexKind, KeyValue, TableSpec};

/// Render the `CREATE TABLE` statement for a desired table.
pub fn create_table(spec: &TableSpec) -> String {
    let mut clauses: Vec<String> = Vec::new();

    for column in &spec.columns {
        let mut clause = format!("`{}` {}", column.name, column.ty.name());
        if let Some(family) = &column.family {
            clause.push_str(&format!(" FAMILY `{family}`"));
        }
        if column.not_null {
            clause.push_str(" NOT NULL");
        }
        clauses.push(clause);
    }

    for index in &spec.indexes {
        let kind = match index.kind {
            IndexKind::GlobalSync => "GLOBAL SYNC",
            IndexKind::GlobalAsync => "GLOBAL ASYNC",
        };
        let mut clause = format!(
            "INDEX `{}` {kind} ON ({})",
            index.name,
            quote_list(&index.columns)
        );
        if !index.cover.is_empty() {
            clause.push_str(&format!(" COVER ({})", quote_list(&index.cover)));
        }
        clauses.push(clause);
    }

    for family in &spec.families {
        let mut settings = Vec::new();
        if let Some(data) = &family.data {
            settings.push(format!("DATA = {}", quote_str(data)));
        }
        if let Some(compression) = &family.compression {
            settings.push(format!("COMPRESSION = {}", quote_str(compression)));
        }
        clauses.push(format!("FAMILY `{}` ({})", family.name, settings.join(", ")));
    }

    clauses.push(format!("PRIMARY KEY ({})", quote_list(&spec.primary_key)));

    let mut statement = format!("CREATE TABLE `{}` (\n", spec.full_path());
    for (i, clause) in clauses.iter().enumerate() {
        let sep = if i + 1 == clauses.len() { "" } else { "," };
        statement.push_str(&format!("    {clause}{sep}\n"));
    }
    statement.push(')');

    let with = with_options(spec);
    if !with.is_empty() {
        statement.push_str("\nWITH (\n");
        for (i, option) in with.iter().enumerate() {
            let sep = if i + 1 == with.len() { "" } else { "," };
            statement.push_str(&format!("    {option}{sep}\n"));
        }
        statement.push(')');
    }
    statement
}

/// Render the `DROP TABLE` statement for an absolute path.
pub fn drop_table(full_path: &str) -> String {
    format!("DROP TABLE `{full_path}`;")
}

fn with_options(spec: &TableSpec) -> Vec<String> {
    let mut options = Vec::new();
    if let Some(enabled) = spec.bloom_filter_enabled {
        options.push(format!("KEY_BLOOM_FILTER = {}", feature(enabled)));
    }
    if let Some(ttl) = &spec.ttl {
        options.push(format!(
            "TTL = Interval({}) ON `{}`",
            quote_str(&ttl.expire_interval),
            ttl.column_name
        ));
    }
    if let Some(replicas) = &spec.read_replicas_settings {
        options.push(format!("READ_REPLICAS_SETTINGS = {}", quote_str(replicas)));
    }

    let partitioning = &spec.partitioning;
    if let Some(count) = partitioning.uniform_partitions {
        options.push(format!("UNIFORM_PARTITIONS = {count}"));
    }
    if !partitioning.partition_at_keys.is_empty() {
        let tuples: Vec<String> = partitioning
            .partition_at_keys
            .iter()
            .map(|tuple| {
                let keys: Vec<String> = tuple.iter().map(render_key).collect();
                format!("({})", keys.join(", "))
            })
            .collect();
        options.push(format!("PARTITION_AT_KEYS = ({})", tuples.join(", ")));
    }
    if let Some(enabled) = partitioning.by_size_enabled {
        options.push(format!("AUTO_PARTITIONING_BY_SIZE_ENABLED = {}", feature(enabled)));
    }
    if let Some(enabled) = partitioning.by_load_enabled {
        options.push(format!("AUTO_PARTITIONING_BY_LOAD = {}", feature(enabled)));
    }
    if let Some(count) = partitioning.min_partitions_count {
        options.push(format!("AUTO_PARTITIONING_MIN_PARTITIONS_COUNT = {count}"));
    }
    if let Some(count) = partitioning.max_partitions_count {
        options.push(format!("AUTO_PARTITIONING_MAX_PARTITIONS_COUNT = {count}"));
    }
    options
}

fn feature(enabled: bool) -> &'static str {
    if enabled { "ENABLED" } else { "DISABLED" }
}

fn render_key(key: &KeyValue) -> String {
    match key {
        KeyValue::Bool(b) => b.to_string(),
        KeyValue::Int(i) => i.to_string(),
        KeyValue::Uint(u) => u.to_string(),
        KeyValue::Double(d) => d.to_string(),
        KeyValue::Text(s) => quote_str(s),
    }
}

fn quote_list(names: &[String]) -> String {
    names.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(", ")
}

fn quote_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
