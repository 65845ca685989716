//! mstore CLI
//!
//! Entry point for the `mstore` command-line tool. Acts as the caller of the
//! storage capability against a local directory: it copies artifact bytes
//! after `insert` and, when asked, purges directories after `clean`.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mstore::batch::collect_artifacts;
use mstore::config::{EffectiveConfig, Settings};
use mstore::{ManagedStorage, MutexKey, MutexRegistry, ProvenanceRecord, RetentionPolicy, Selection};
use mstore_fs::LocalFs;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mstore")]
#[command(about = "Versioned artifact storage", version)]
struct Cli {
    /// Path to project config file (default: .mstore.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Storage root directory (overrides storage.root)
    #[arg(long, global = true)]
    root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Base directory of the storage root, relative to the root directory
    #[arg(long, short = 'b', default_value = "")]
    base: String,

    /// Mutex key parts (default: storage root and base)
    #[arg(long = "key", short = 'k')]
    key: Vec<String>,

    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert files and directories as a new version
    Insert {
        #[command(flatten)]
        target: Target,

        /// Provenance trail as JSON (an array, or a single record)
        #[arg(long)]
        trail: Option<String>,

        /// Files or directories to insert
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Resolve a version and list its artifacts
    Select {
        #[command(flatten)]
        target: Target,

        /// Exact version to resolve (default: latest)
        #[arg(long)]
        version: Option<String>,
    },

    /// Drop old versions from the manifest
    Clean {
        #[command(flatten)]
        target: Target,

        /// Number of most recent versions to keep (default: retention.max_versions)
        #[arg(long)]
        max_versions: Option<usize>,

        /// Also delete the directories of removed versions
        #[arg(long)]
        purge: bool,
    },

    /// List versions, most recent first
    Versions {
        #[command(flatten)]
        target: Target,
    },

    /// Print the effective configuration with provenance
    Config,
}

/// Everything a command needs once configuration is loaded
struct Context {
    settings: Settings,
    storage: ManagedStorage,
    fs: LocalFs,
}

impl Context {
    fn mutex_key(&self, target: &Target) -> MutexKey {
        if target.key.is_empty() {
            MutexKey::new([self.settings.storage.root.clone(), target.base.clone()])
        } else {
            MutexKey::new(target.key.clone())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let effective = match load_config(cli.config.as_deref(), cli.root.as_deref()) {
        Ok(c) => c,
        Err(e) => fail("Error loading config", e),
    };
    let settings = match effective.settings() {
        Ok(s) => s,
        Err(e) => fail("Invalid config", e),
    };
    init_tracing(&settings.log_filter);

    if let Commands::Config = cli.command {
        print_json(&effective);
        return;
    }

    let options = match settings.storage_options() {
        Ok(o) => o,
        Err(e) => fail("Invalid config", e),
    };
    let ctx = Context {
        fs: LocalFs::new(&settings.storage.root),
        storage: ManagedStorage::with_options(Arc::new(MutexRegistry::new()), options),
        settings,
    };

    match cli.command {
        Commands::Insert { target, trail, paths } => run_insert(&ctx, &target, trail.as_deref(), &paths).await,
        Commands::Select { target, version } => run_select(&ctx, &target, version).await,
        Commands::Clean {
            target,
            max_versions,
            purge,
        } => run_clean(&ctx, &target, max_versions, purge).await,
        Commands::Versions { target } => run_versions(&ctx, &target).await,
        Commands::Config => {}
    }
}

fn load_config(project: Option<&Path>, root: Option<&str>) -> Result<EffectiveConfig, mstore::config::ConfigError> {
    let host = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/mstore/config.toml"));
    let project = project.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".mstore.toml"));
    let overrides = root.map(|root| serde_json::json!({ "storage": { "root": root } }));

    EffectiveConfig::build(host.as_deref(), Some(&project), overrides)
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_insert(ctx: &Context, target: &Target, trail: Option<&str>, paths: &[PathBuf]) {
    let trail = match parse_trail(trail) {
        Ok(t) => t,
        Err(e) => fail("Invalid --trail", e),
    };
    let artifacts = match collect_artifacts(paths) {
        Ok(a) => a,
        Err(e) => fail("Error collecting artifacts", e),
    };

    let key = ctx.mutex_key(target);
    let outcome = match ctx.storage.insert(&ctx.fs, &target.base, &key, &artifacts, &trail).await {
        Ok(o) => o,
        Err(e) => fail("Insert failed", e),
    };

    for artifact in &outcome.insertable_artifacts {
        if let Err(e) = ctx
            .fs
            .copy_into(Path::new(&artifact.source_path), &artifact.destination_path)
            .await
        {
            fail(&format!("Failed to copy {}", artifact.name), e);
        }
    }
    info!(version = %outcome.version, artifacts = artifacts.len(), "inserted");

    if target.json {
        print_json(&outcome);
    } else {
        println!("Inserted version {}", outcome.version);
        for artifact in &outcome.insertable_artifacts {
            println!("  {} -> {}", artifact.source_path, artifact.destination_path);
        }
    }
}

async fn run_select(ctx: &Context, target: &Target, version: Option<String>) {
    let selection = version.map(Selection::specific).unwrap_or(Selection::Latest);
    let key = ctx.mutex_key(target);

    let outcome = match ctx.storage.select(&ctx.fs, &target.base, &key, &selection).await {
        Ok(o) => o,
        Err(e) => fail("Select failed", e),
    };

    if target.json {
        print_json(&outcome);
    } else {
        println!("Version {}", outcome.resolved_version);
        for artifact in &outcome.selectable_artifacts {
            println!("  {}  {}", artifact.name, artifact.path);
        }
    }
}

async fn run_clean(ctx: &Context, target: &Target, max_versions: Option<usize>, purge: bool) {
    let policy = max_versions
        .map(RetentionPolicy::keep_last_n)
        .unwrap_or_else(|| ctx.settings.retention_policy());
    let key = ctx.mutex_key(target);

    let outcome = match ctx.storage.clean(&ctx.fs, &target.base, &key, &policy).await {
        Ok(o) => o,
        Err(e) => fail("Clean failed", e),
    };

    let mut purged = Vec::new();
    if purge {
        for dir in outcome.removable_dirs(&target.base) {
            match ctx.fs.remove_dir(&dir).await {
                Ok(true) => purged.push(dir),
                Ok(false) => warn!(dir = %dir, "version directory already gone"),
                Err(e) => fail(&format!("Failed to purge {}", dir), e),
            }
        }
    }

    if target.json {
        print_json(&serde_json::json!({
            "removableItems": outcome.removable_items,
            "retained": outcome.retained,
            "purged": purged,
        }));
    } else if outcome.removable_items.is_empty() {
        println!("Nothing to clean ({} versions kept)", outcome.retained);
    } else {
        println!(
            "Removed {} versions ({} bytes), kept {}",
            outcome.removable_items.len(),
            outcome.reclaimable_bytes(),
            outcome.retained
        );
        for item in &outcome.removable_items {
            let mark = if purge { " [purged]" } else { "" };
            println!("  {}{}", item.version, mark);
        }
    }
}

async fn run_versions(ctx: &Context, target: &Target) {
    let key = ctx.mutex_key(target);
    let items = match ctx.storage.versions(&ctx.fs, &target.base, &key).await {
        Ok(i) => i,
        Err(e) => fail("Failed to read manifest", e),
    };

    if target.json {
        print_json(&items);
    } else if items.is_empty() {
        println!("No versions.");
    } else {
        for item in &items {
            println!("  {}  {} bytes", item.version, item.total_size);
        }
    }
}

fn parse_trail(raw: Option<&str>) -> Result<Vec<ProvenanceRecord>, serde_json::Error> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    Ok(match serde_json::from_str(raw)? {
        serde_json::Value::Array(records) => records,
        record => vec![record],
    })
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail("Error serializing output", e),
    }
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, err);
    process::exit(1);
}
