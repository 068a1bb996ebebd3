//! converge: operator CLI for the Converge reconciler.
//!
//! Loads a toml manifest describing tables and topics, reconciles each
//! declared entity, and keeps the persisted identifiers in a JSON state
//! file next to the manifest. Runs against the in-memory backend until
//! a network client lands, which makes `apply` a dry-run harness: it
//! exercises the full reconcile cycle and prints what would happen.
//!
//! ```text
//! converge apply -f converge.toml
//! converge render -f converge.toml
//! converge id 'grpcs://db.example.com:2135/?database=/region/cloud/db/orders'
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use converge_backend::MemoryBackend;
use converge_core::config::fields;
use converge_core::{Diagnostics, EntityId, Resource, Severity, TableConfig, TopicConfig};
use converge_reconcile::{TableReconciler, TopicReconciler, expand_table, statement};

#[derive(Parser)]
#[command(
    name = "converge",
    about = "Declarative reconciler for database tables and topics",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Credential token for the control plane.
    #[arg(long, env = "CONVERGE_TOKEN", default_value = "", global = true)]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile every entity in the manifest (create or update).
    Apply {
        /// Manifest file.
        #[arg(short, long, default_value = "converge.toml")]
        file: PathBuf,
        /// State file holding persisted identifiers.
        #[arg(long, default_value = "converge.state.json")]
        state: PathBuf,
    },
    /// Read every known entity back and print its configuration.
    Read {
        #[arg(short, long, default_value = "converge.toml")]
        file: PathBuf,
        #[arg(long, default_value = "converge.state.json")]
        state: PathBuf,
    },
    /// Delete every entity in the manifest.
    Delete {
        #[arg(short, long, default_value = "converge.toml")]
        file: PathBuf,
        #[arg(long, default_value = "converge.state.json")]
        state: PathBuf,
    },
    /// Print the CREATE TABLE statements the manifest would execute.
    Render {
        #[arg(short, long, default_value = "converge.toml")]
        file: PathBuf,
    },
    /// Decode a persisted entity identifier.
    Id { id: String },
}

/// Top-level manifest: `[[table]]` and `[[topic]]` blocks.
#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default, rename = "table")]
    tables: Vec<TableConfig>,
    #[serde(default, rename = "topic")]
    topics: Vec<TopicConfig>,
}

impl Manifest {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse manifest {}", path.display()))
    }
}

/// Persisted identifiers, keyed `table:{path}` / `topic:{name}`.
#[derive(Debug, Default)]
struct StateFile {
    path: PathBuf,
    ids: BTreeMap<String, String>,
}

impl StateFile {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let ids = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("failed to parse state file {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read state file {}", path.display()));
            }
        };
        Ok(StateFile { path: path.to_path_buf(), ids })
    }

    fn save(&self) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(&self.ids)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write state file {}", self.path.display()))
    }

    fn record(&mut self, key: &str, id: Option<&String>) {
        match id {
            Some(id) => self.ids.insert(key.to_string(), id.clone()),
            None => self.ids.remove(key),
        };
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Apply { file, state } => apply(&file, &state, &cli.token).await,
        Command::Read { file, state } => read(&file, &state, &cli.token).await,
        Command::Delete { file, state } => delete(&file, &state, &cli.token).await,
        Command::Render { file } => render(&file),
        Command::Id { id } => decode_id(&id),
    }
}

async fn apply(file: &Path, state_path: &Path, token: &str) -> anyhow::Result<()> {
    let manifest = Manifest::load(file)?;
    let mut state = StateFile::load(state_path)?;
    let backend = MemoryBackend::new();
    let tables = TableReconciler::new(backend.clone(), token);
    let topics = TopicReconciler::new(backend.clone(), token);
    let mut failed = false;

    for config in manifest.tables {
        let key = format!("table:{}", config.path);
        let mut res = resource(&state, &key, config);
        let diags = match res.id {
            Some(_) => tables.update(&mut res).await,
            None => tables.create(&mut res).await,
        };
        state.record(&key, res.id.as_ref());
        failed |= report(&key, &diags);
    }

    for config in manifest.topics {
        let key = format!("topic:{}", config.name);
        let mut res = resource(&state, &key, config);
        if let Some(renamed) = renamed_topic(&res) {
            info!(old = %renamed, new = %res.config.name, "topic rename detected");
            res.pending.mark(fields::NAME);
        }
        let diags = match res.id {
            Some(_) => topics.update(&mut res).await,
            None => topics.create(&mut res).await,
        };
        state.record(&key, res.id.as_ref());
        failed |= report(&key, &diags);
    }

    state.save()?;
    if failed {
        anyhow::bail!("apply finished with errors");
    }
    Ok(())
}

async fn read(file: &Path, state_path: &Path, token: &str) -> anyhow::Result<()> {
    let manifest = Manifest::load(file)?;
    let mut state = StateFile::load(state_path)?;
    let backend = MemoryBackend::new();
    let tables = TableReconciler::new(backend.clone(), token);
    let topics = TopicReconciler::new(backend.clone(), token);

    for config in manifest.tables {
        let key = format!("table:{}", config.path);
        let mut res = resource(&state, &key, config);
        report(&key, &tables.read(&mut res).await);
        state.record(&key, res.id.as_ref());
        println!("# {key}\n{}", toml::to_string_pretty(&res.config)?);
    }
    for config in manifest.topics {
        let key = format!("topic:{}", config.name);
        let mut res = resource(&state, &key, config);
        report(&key, &topics.read(&mut res).await);
        state.record(&key, res.id.as_ref());
        println!("# {key}\n{}", toml::to_string_pretty(&res.config)?);
    }

    state.save()
}

async fn delete(file: &Path, state_path: &Path, token: &str) -> anyhow::Result<()> {
    let manifest = Manifest::load(file)?;
    let mut state = StateFile::load(state_path)?;
    let backend = MemoryBackend::new();
    let tables = TableReconciler::new(backend.clone(), token);
    let topics = TopicReconciler::new(backend.clone(), token);
    let mut failed = false;

    for config in manifest.tables {
        let key = format!("table:{}", config.path);
        let mut res = resource(&state, &key, config);
        failed |= report(&key, &tables.delete(&mut res).await);
        state.record(&key, res.id.as_ref());
    }
    for config in manifest.topics {
        let key = format!("topic:{}", config.name);
        let mut res = resource(&state, &key, config);
        failed |= report(&key, &topics.delete(&mut res).await);
        state.record(&key, res.id.as_ref());
    }

    state.save()?;
    if failed {
        anyhow::bail!("delete finished with errors");
    }
    Ok(())
}

fn render(file: &Path) -> anyhow::Result<()> {
    let manifest = Manifest::load(file)?;
    for config in &manifest.tables {
        let spec = expand_table(config, None)?;
        println!("{}\n", statement::create_table(&spec));
    }
    Ok(())
}

fn decode_id(id: &str) -> anyhow::Result<()> {
    let entity = EntityId::decode(id)?;
    println!("endpoint: {}", entity.prepare_full_endpoint());
    println!("database: {}", entity.endpoint.database);
    println!("path:     {}", entity.entity_path());
    println!("full:     {}", entity.full_path());
    Ok(())
}

fn resource<C>(state: &StateFile, key: &str, config: C) -> Resource<C> {
    match state.ids.get(key) {
        Some(id) => Resource::existing(id.clone(), config),
        None => Resource::new(config),
    }
}

/// The previously-applied topic path when the manifest declares a
/// different name for the same entity.
fn renamed_topic(res: &Resource<TopicConfig>) -> Option<String> {
    let entity = res.entity().ok()??;
    (entity.entity_path() != res.config.name).then(|| entity.entity_path().to_string())
}

/// Print diagnostics for one entity; returns true when any is an error.
fn report(key: &str, diags: &Diagnostics) -> bool {
    for diag in diags.iter() {
        let label = match diag.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        eprintln!("{label}: {key}: {}: {}", diag.summary, diag.detail);
    }
    diags.has_errors()
}
