//! `frs`: command-line access to a file-backed resource store.
//!
//! Every command opens the store under `--data-dir`, performs one operation and prints the
//! result as pretty JSON. Failures are printed as `<ErrorKind>: <message>` with a non-zero exit
//! status.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use fhir::ResourceKind;
use frs_core::config::profiles_from_env_value;
use frs_core::constants::{DEFAULT_DATA_DIR, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use frs_core::{Actor, ResourceStore, StoreConfig, StoreResult, Validator};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "frs")]
#[command(about = "FHIR resource store CLI")]
struct Cli {
    /// Root directory of the version files
    #[arg(long, env = "FRS_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// YAML file with profile definitions
    #[arg(long, env = "FRS_PROFILE_FILE", global = true)]
    profile_file: Option<String>,

    /// Recorded as the actor of mutations
    #[arg(long, env = "FRS_ACTOR", global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a resource without storing it
    Validate {
        /// JSON file, or `-` for stdin
        file: String,
    },
    /// Create a resource
    Create {
        /// Resource type, e.g. Patient
        resource_type: String,
        /// JSON file, or `-` for stdin
        file: String,
    },
    /// Read the current or a specific version
    Read {
        resource_type: String,
        id: String,
        /// Version id to read instead of the current version
        #[arg(long)]
        version: Option<u64>,
    },
    /// Replace the current version
    Update {
        resource_type: String,
        id: String,
        /// JSON file, or `-` for stdin
        file: String,
        /// Version the update is based on
        #[arg(long)]
        if_match: Option<u64>,
    },
    /// Delete a resource (earlier versions stay readable)
    Delete { resource_type: String, id: String },
    /// List every version, newest first
    History { resource_type: String, id: String },
    /// Search with `name=value` parameters
    Search {
        resource_type: String,
        /// Parameters such as `family=smith` or `_count=5`
        params: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("frs_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    run(cli, &mut stdout.lock())
}

fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let profiles = profiles_from_env_value(cli.profile_file.clone())?;
    let actor = match cli.actor.as_deref() {
        Some(name) => Actor::new(name).context("--actor must not be blank")?,
        None => Actor::anonymous(),
    };
    let data_dir = cli.data_dir.clone();
    let open_store = |profiles| -> anyhow::Result<ResourceStore> {
        let cfg = StoreConfig::new(
            DEFAULT_PAGE_SIZE,
            MAX_PAGE_SIZE,
            true,
            Some(data_dir),
            profiles,
        )?;
        ResourceStore::open(cfg).map_err(described)
    };

    let output = match cli.command {
        Commands::Validate { file } => {
            let candidate = read_json(&file)?;
            Validator::new(profiles)
                .validate(&candidate)
                .map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))?;
            json!({"valid": true})
        }
        Commands::Create {
            resource_type,
            file,
        } => {
            let store = open_store(profiles)?;
            let kind = parse_kind(&resource_type)?;
            let created = checked(store.create(&actor, kind, &read_json(&file)?))?;
            created.to_value()?
        }
        Commands::Read {
            resource_type,
            id,
            version,
        } => {
            let store = open_store(profiles)?;
            let kind = parse_kind(&resource_type)?;
            let resource = match version {
                Some(v) => checked(store.read_version(kind, &id, v))?,
                None => checked(store.read(kind, &id))?,
            };
            resource.to_value()?
        }
        Commands::Update {
            resource_type,
            id,
            file,
            if_match,
        } => {
            let store = open_store(profiles)?;
            let kind = parse_kind(&resource_type)?;
            let candidate = read_json(&file)?;
            let updated = checked(store.update(&actor, kind, &id, &candidate, if_match))?;
            updated.to_value()?
        }
        Commands::Delete { resource_type, id } => {
            let store = open_store(profiles)?;
            let kind = parse_kind(&resource_type)?;
            let version = checked(store.delete(&actor, kind, &id))?;
            json!({"deleted": format!("{kind}/{id}"), "versionId": version.to_string()})
        }
        Commands::History { resource_type, id } => {
            let store = open_store(profiles)?;
            let kind = parse_kind(&resource_type)?;
            let versions = checked(store.history(kind, &id))?;
            serde_json::to_value(versions.iter().map(|v| v.as_ref()).collect::<Vec<_>>())?
        }
        Commands::Search {
            resource_type,
            params,
        } => {
            let store = open_store(profiles)?;
            let kind = parse_kind(&resource_type)?;
            let params = params
                .iter()
                .map(|p| parse_param(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let page = checked(store.search(kind, &params))?;
            let resources = page
                .resources
                .iter()
                .map(|r| r.to_value())
                .collect::<Result<Vec<_>, _>>()?;
            json!({
                "total": page.total,
                "offset": page.offset,
                "count": page.count,
                "nextOffset": page.next_offset,
                "resources": resources,
            })
        }
    };

    writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
    Ok(())
}

fn described(e: frs_core::StoreError) -> anyhow::Error {
    anyhow::anyhow!("{}: {e}", e.kind())
}

fn checked<T>(result: StoreResult<T>) -> anyhow::Result<T> {
    result.map_err(described)
}

fn parse_kind(name: &str) -> anyhow::Result<ResourceKind> {
    name.parse::<ResourceKind>()
        .with_context(|| format!("unsupported resource type '{name}'"))
}

/// Split `name=value`. A missing `=` means an empty value.
fn parse_param(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw.split_once('=').unwrap_or((raw, ""));
    if name.is_empty() {
        anyhow::bail!("search parameter '{raw}' has no name");
    }
    Ok((name.to_owned(), value.to_owned()))
}

fn read_json(source: &str) -> anyhow::Result<Value> {
    let text = if source == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        buffer
    } else {
        fs::read_to_string(Path::new(source))
            .with_context(|| format!("failed to read {source}"))?
    };
    serde_json::from_str(&text).with_context(|| format!("{source} is not valid JSON"))
}
