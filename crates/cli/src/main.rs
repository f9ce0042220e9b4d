use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use archon_api::{Lifecycle, PollerConfig, Provider, ResourceState};
use archon_apply::{diff_summary, DiffSummary};
use archon_core::tree::Block;
use archon_kubehub::KubeArchon;
use archon_persist::{now_ts, SqliteStore, StateRecord, StateStore};
use archon_schema::ResourceSchema;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info, warn};

mod manifest;

use manifest::{address, split_address, Declared};

#[derive(Parser, Debug)]
#[command(name = "archonctl", version, about = "Manage archon.kubeup.com resources from configuration files")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// State database (default: $ARCHON_STATE_PATH or ~/.archon/state.db)
    #[arg(long = "state", global = true)]
    state: Option<String>,

    /// Kubeconfig context (default: current context)
    #[arg(long = "context", global = true)]
    context: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, replace or update every resource declared in a file
    Apply {
        /// YAML or JSON configuration
        #[arg(short = 'f', long = "file")]
        file: String,
        /// Only report what would happen
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
    },
    /// Re-read resources and drop state for objects deleted out of band
    Refresh {
        /// Limit to one address, e.g. "archon_network.main"
        address: Option<String>,
    },
    /// Delete a resource and forget its state
    Destroy { address: String },
    /// Adopt an existing object under a new address
    Import {
        /// Resource type, e.g. "archon_instance"
        type_name: String,
        /// Local name for the address
        name: String,
        /// Identifier "<namespace>/<name>"
        id: String,
    },
    /// Print stored state (all addresses, or one tree)
    Show {
        address: Option<String>,
        /// Also print the snapshots kept before the last writes
        #[arg(long = "history", action = ArgAction::SetTrue, requires = "address")]
        history: bool,
    },
    /// Check whether the object behind an address still exists
    Exists { address: String },
}

fn init_tracing() {
    let env = std::env::var("ARCHON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ARCHON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid ARCHON_METRICS_ADDR; expected host:port");
        }
    }
}

async fn connect(context: Option<&str>) -> Result<Provider> {
    let kube = Arc::new(KubeArchon::connect(context).await?);
    Ok(Provider::new(kube.clone(), kube, PollerConfig::from_env()))
}

fn open_store(path: Option<&str>) -> Result<SqliteStore> {
    match path {
        Some(p) => SqliteStore::open(p),
        None => SqliteStore::open_default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Action { Create, Replace, Update, Unchanged, Refreshed, Gone, Deleted, Imported }

#[derive(Debug, Serialize)]
struct Outcome {
    address: String,
    action: Action,
    id: Option<String>,
    #[serde(flatten)]
    diff: DiffSummary,
    /// Force-new paths behind a replacement.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    replaced: Vec<String>,
}

impl Outcome {
    fn new(address: String, action: Action, id: Option<String>) -> Self {
        Self { address, action, id, diff: DiffSummary::default(), replaced: Vec::new() }
    }
}

fn print_outcomes(output: Output, outcomes: &[Outcome]) -> Result<()> {
    match output {
        Output::Human => {
            for o in outcomes {
                let action = serde_json::to_value(o.action)?.as_str().unwrap_or_default().to_string();
                let id = o.id.as_deref().unwrap_or("-");
                print!("{:<32} {:<10} {:<28} +{} ~{} -{}", o.address, action, id, o.diff.adds, o.diff.updates, o.diff.removes);
                if !o.replaced.is_empty() { print!("  (forces replacement: {})", o.replaced.join(", ")); }
                println!();
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(outcomes)?),
    }
    Ok(())
}

fn load_state(schema: &ResourceSchema, rec: &StateRecord) -> Result<ResourceState> {
    let json: serde_json::Value = serde_json::from_str(&rec.attrs_json).with_context(|| format!("state of {}", rec.address))?;
    let attrs = archon_schema::restore(schema, &json).with_context(|| format!("state of {}", rec.address))?;
    let id = (!rec.id.is_empty()).then(|| rec.id.clone());
    Ok(ResourceState { id, attrs })
}

fn save_state(store: &dyn StateStore, address: &str, type_name: &str, state: &ResourceState) -> Result<()> {
    store.put(StateRecord {
        address: address.to_string(),
        type_name: type_name.to_string(),
        id: state.id.clone().unwrap_or_default(),
        attrs_json: archon_schema::encode(&state.attrs).to_string(),
        ts: now_ts(),
    })
}

fn lifecycle<'a>(provider: &'a Provider, type_name: &str) -> Result<&'a dyn Lifecycle> {
    provider.resource(type_name).ok_or_else(|| anyhow!("unknown resource type {type_name:?}"))
}

fn stored(store: &dyn StateStore, address: &str) -> Result<StateRecord> {
    store.get(address)?.ok_or_else(|| anyhow!("no state for {address}"))
}

/// Decide what applying `decl` over `prior` does, without touching the server.
fn plan(lc: &dyn Lifecycle, decl: &Declared, prior: Option<&ResourceState>) -> (Action, Vec<String>) {
    match prior {
        Some(state) if state.id.is_some() => {
            let replaced = archon_schema::requires_replacement(decl.schema, &state.attrs, &decl.attrs);
            if !replaced.is_empty() {
                (Action::Replace, replaced)
            } else if lc.planned_patch(&state.attrs, &decl.attrs).is_empty() {
                (Action::Unchanged, replaced)
            } else {
                (Action::Update, replaced)
            }
        }
        _ => (Action::Create, Vec::new()),
    }
}

async fn apply_one(provider: &Provider, store: &dyn StateStore, decl: &Declared, dry_run: bool) -> Result<Outcome> {
    let t0 = Instant::now();
    let addr = decl.address();
    let type_name = decl.schema.type_name;
    let lc = lifecycle(provider, type_name)?;
    let prior = store.get(&addr)?.map(|rec| load_state(decl.schema, &rec)).transpose()?;
    let (action, replaced) = plan(lc, decl, prior.as_ref());
    let before = prior.as_ref().map(|s| s.attrs.clone()).unwrap_or_default();

    let mut outcome = Outcome::new(addr.clone(), action, prior.as_ref().and_then(|s| s.id.clone()));
    outcome.replaced = replaced;
    if dry_run {
        outcome.diff = diff_summary(&decl.attrs, &before);
        return Ok(outcome);
    }

    let mut state = match (action, prior) {
        (Action::Replace, Some(mut old)) => {
            lc.delete(&mut old).await.with_context(|| format!("{addr}: delete before replace"))?;
            save_state(store, &addr, type_name, &old)?;
            ResourceState::desired(decl.attrs.clone())
        }
        (Action::Update | Action::Unchanged, Some(old)) => old,
        _ => ResourceState::desired(decl.attrs.clone()),
    };
    let result = match action {
        Action::Update | Action::Unchanged => lc.update(&mut state, &decl.attrs).await,
        _ => lc.create(&mut state).await,
    };
    if let Err(e) = result {
        // A create that failed after submission still leaves an object behind.
        if state.id.is_some() { save_state(store, &addr, type_name, &state)?; }
        error!(address = %addr, error = %e, "apply failed");
        return Err(anyhow::Error::new(e).context(format!("{addr}: {action:?} failed")));
    }
    save_state(store, &addr, type_name, &state)?;
    outcome.id = state.id.clone();
    outcome.diff = diff_summary(&state.attrs, &before);
    info!(address = %addr, action = ?action, took_ms = %t0.elapsed().as_millis(), "apply ok");
    Ok(outcome)
}

async fn refresh_one(provider: &Provider, store: &dyn StateStore, rec: &StateRecord) -> Result<Outcome> {
    let lc = lifecycle(provider, &rec.type_name)?;
    let mut state = load_state(lc.schema(), rec)?;
    let before = state.attrs.clone();
    if state.id.is_none() {
        store.remove(&rec.address)?;
        return Ok(Outcome::new(rec.address.clone(), Action::Gone, None));
    }
    lc.read(&mut state).await.with_context(|| format!("{}: refresh failed", rec.address))?;
    if state.id.is_none() {
        warn!(address = %rec.address, "object deleted out of band; dropping state");
        store.remove(&rec.address)?;
        return Ok(Outcome::new(rec.address.clone(), Action::Gone, None));
    }
    save_state(store, &rec.address, &rec.type_name, &state)?;
    let mut outcome = Outcome::new(rec.address.clone(), Action::Refreshed, state.id.clone());
    outcome.diff = diff_summary(&state.attrs, &before);
    Ok(outcome)
}

fn show(output: Output, store: &dyn StateStore, address: Option<&str>, history: bool) -> Result<()> {
    let Some(addr) = address else {
        let records = store.list()?;
        match output {
            Output::Human => {
                println!("{:<32} {:<28} UPDATED", "ADDRESS", "ID");
                for r in &records {
                    println!("{:<32} {:<28} {}", r.address, if r.id.is_empty() { "-" } else { &r.id }, r.ts);
                }
            }
            Output::Json => {
                let rows: Vec<_> = records.iter().map(|r| serde_json::json!({"address": r.address, "id": r.id, "ts": r.ts})).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }
        return Ok(());
    };
    let records = if history { snapshots(store, addr)? } else { vec![stored(store, addr)?] };
    let mut rendered = Vec::with_capacity(records.len());
    for rec in &records {
        let schema = archon_schema::by_type_name(&rec.type_name).ok_or_else(|| anyhow!("unknown resource type {:?}", rec.type_name))?;
        let state = load_state(schema, rec)?;
        rendered.push((rec, archon_schema::encode_redacted(schema, &state.attrs)));
    }
    match output {
        Output::Human => {
            for (rec, shown) in &rendered {
                let id = if rec.id.is_empty() { "-" } else { rec.id.as_str() };
                if history { println!("# {} ({id}) @ {}", rec.address, rec.ts) } else { println!("# {} ({id})", rec.address) }
                print!("{}", serde_yaml::to_string(shown)?);
            }
        }
        Output::Json => {
            let rows: Vec<_> = rendered
                .iter()
                .map(|(rec, shown)| serde_json::json!({"address": rec.address, "id": rec.id, "ts": rec.ts, "attrs": shown}))
                .collect();
            match rows.as_slice() {
                [one] if !history => println!("{}", serde_json::to_string_pretty(one)?),
                _ => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
    }
    Ok(())
}

/// Current record first, then older snapshots, newest first.
fn snapshots(store: &dyn StateStore, address: &str) -> Result<Vec<StateRecord>> {
    let mut out = vec![stored(store, address)?];
    out.extend(store.history(address, None)?);
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let store = open_store(cli.state.as_deref())?;

    match cli.command {
        Commands::Apply { file, dry_run } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {file}"))?;
            let decls = manifest::load(&text).with_context(|| format!("loading {file}"))?;
            info!(file = %file, resources = decls.len(), dry_run, "apply invoked");
            let provider = connect(cli.context.as_deref()).await?;
            let mut outcomes = Vec::with_capacity(decls.len());
            for decl in &decls {
                match apply_one(&provider, &store, decl, dry_run).await {
                    Ok(o) => outcomes.push(o),
                    Err(e) => {
                        print_outcomes(cli.output, &outcomes)?;
                        return Err(e);
                    }
                }
            }
            print_outcomes(cli.output, &outcomes)?;
        }
        Commands::Refresh { address } => {
            let records = match address {
                Some(a) => vec![stored(&store, &a)?],
                None => store.list()?,
            };
            let provider = connect(cli.context.as_deref()).await?;
            let mut outcomes = Vec::with_capacity(records.len());
            for rec in &records {
                outcomes.push(refresh_one(&provider, &store, rec).await?);
            }
            print_outcomes(cli.output, &outcomes)?;
        }
        Commands::Destroy { address } => {
            let rec = stored(&store, &address)?;
            let provider = connect(cli.context.as_deref()).await?;
            let lc = lifecycle(&provider, &rec.type_name)?;
            let mut state = load_state(lc.schema(), &rec)?;
            let id = state.id.clone();
            if state.id.is_some() {
                lc.delete(&mut state).await.with_context(|| format!("{address}: delete failed"))?;
            }
            store.remove(&address)?;
            print_outcomes(cli.output, &[Outcome::new(address, Action::Deleted, id)])?;
        }
        Commands::Import { type_name, name, id } => {
            let addr = address(&type_name, &name);
            split_address(&addr)?;
            if store.get(&addr)?.is_some() {
                bail!("{addr} is already managed; destroy or rename it first");
            }
            let provider = connect(cli.context.as_deref()).await?;
            let lc = lifecycle(&provider, &type_name)?;
            let state = lc.import(&id).await.with_context(|| format!("importing {id} as {addr}"))?;
            save_state(&store, &addr, &type_name, &state)?;
            let mut outcome = Outcome::new(addr, Action::Imported, state.id.clone());
            outcome.diff = diff_summary(&state.attrs, &Block::new());
            print_outcomes(cli.output, &[outcome])?;
        }
        Commands::Show { address, history } => show(cli.output, &store, address.as_deref(), history)?,
        Commands::Exists { address } => {
            let rec = stored(&store, &address)?;
            let provider = connect(cli.context.as_deref()).await?;
            let lc = lifecycle(&provider, &rec.type_name)?;
            let state = load_state(lc.schema(), &rec)?;
            let exists = state.id.is_some() && lc.exists(&state).await?;
            match cli.output {
                Output::Human => println!("{exists}"),
                Output::Json => println!("{}", serde_json::json!({"address": address, "exists": exists})),
            }
        }
    }
    Ok(())
}
