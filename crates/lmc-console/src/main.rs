mod config;
mod fixtures;
mod prefs;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{load_config, Config, GlobalArgs};
use lmc_core::api::DEFAULT_PAGE_SIZE;
use lmc_core::memory::InMemoryLeadApi;
use lmc_core::{Lead, PageQuery, SystemClock};
use lmc_distribution::{
    distribute_equally, execute, AgentShare, AllocationMode, AllocationPreview, AllocationRequest,
    AssignmentError,
};
use lmc_feed::LiveView;
use prefs::Preferences;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lmc")]
#[command(about = "Lead management console", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Preview how a pool of leads splits across callers
    Allocate(AllocateArgs),
    /// Split a selection across callers and assign it slice by slice
    Assign(AssignArgs),
    /// Drive a live view with a recorded push capture
    Replay(ReplayArgs),
}

#[derive(clap::Args, Debug)]
struct DistributionArgs {
    #[arg(long)]
    mode: Option<AllocationMode>,
    /// `id=value`, repeated per agent in selection order
    #[arg(long = "agent", value_parser = parse_agent)]
    agents: Vec<AgentShare>,
    /// Ignore typed values and split evenly
    #[arg(long, default_value_t = false)]
    equal: bool,
}

#[derive(clap::Args, Debug)]
struct AllocateArgs {
    #[arg(long)]
    pool: usize,
    #[command(flatten)]
    distribution: DistributionArgs,
}

#[derive(clap::Args, Debug)]
struct AssignArgs {
    /// Selected lead ids, in selection order
    #[arg(long, value_delimiter = ',', required = true)]
    leads: Vec<String>,
    /// Seed the backend from a captured list response
    #[arg(long)]
    fixture: Option<PathBuf>,
    #[command(flatten)]
    distribution: DistributionArgs,
}

#[derive(clap::Args, Debug)]
struct ReplayArgs {
    #[arg(long)]
    page: PathBuf,
    #[arg(long)]
    events: PathBuf,
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u32,
    /// `key=value` list filter, repeatable
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// Wait for the coalesced re-sync and print the page after it
    #[arg(long, default_value_t = false)]
    resync: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplayOutput {
    events: usize,
    duplicates: usize,
    deferred: usize,
    decode_errors: Vec<String>,
    reconciled: lmc_feed::ViewSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    resynced: Option<lmc_feed::ViewSnapshot>,
    notices: Vec<lmc_feed::FeedNotice>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.global);
    if !init_logging(&config) {
        eprintln!("lmc: a tracing subscriber was already installed; log settings ignored");
    }

    let result = match cli.command {
        Commands::Allocate(args) => run_allocate(&config, args),
        Commands::Assign(args) => run_assign(&config, args).await,
        Commands::Replay(args) => run_replay(&config, args).await,
    };
    if let Err(err) = &result {
        error!(event = "command_failed", error = %err);
    }
    result
}

/// Returns `false` when another global subscriber already owns the process.
fn init_logging(config: &Config) -> bool {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("LMC_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

fn run_allocate(config: &Config, args: AllocateArgs) -> Result<()> {
    let saved = prefs::load(&config.state_dir);
    let request = build_request(args.pool, &args.distribution, &saved)?;
    let preview = AllocationPreview::build(&request);
    info!(
        event = "allocation_preview",
        mode = %request.mode,
        pool = request.pool_size,
        allocated = preview.allocated,
        balance = %preview.gap_label()
    );
    remember(config, &request);
    print_json(&preview)
}

async fn run_assign(config: &Config, args: AssignArgs) -> Result<()> {
    let saved = prefs::load(&config.state_dir);
    let request = build_request(args.leads.len(), &args.distribution, &saved)?;
    let preview = AllocationPreview::build(&request);
    if !preview.is_submittable() {
        print_json(&preview)?;
        bail!(
            "Allocation is {} for {} selected leads; nothing assigned",
            preview.gap_label(),
            args.leads.len()
        );
    }
    remember(config, &request);

    let leads = match &args.fixture {
        Some(path) => fixtures::load_leads(path).await?,
        None => args.leads.iter().map(Lead::new).collect(),
    };
    let api = InMemoryLeadApi::new(leads);
    match execute(&api, &args.leads, &preview.allocation).await {
        Ok(report) => print_json(&report),
        Err(AssignmentError::SliceFailed {
            batch_id,
            agent_id,
            completed,
            remaining,
            source,
            ..
        }) => {
            print_json(&serde_json::json!({
                "batchId": &batch_id,
                "failedAgent": &agent_id,
                "completed": &completed,
                "remaining": &remaining,
            }))?;
            Err(source).context(format!(
                "Assignment to {agent_id} failed; retry the remaining leads"
            ))
        }
        Err(err) => Err(err.into()),
    }
}

async fn run_replay(config: &Config, args: ReplayArgs) -> Result<()> {
    let leads = fixtures::load_leads(&args.page).await?;
    let recorded = fixtures::load_events(&args.events).await?;
    let query = args
        .filters
        .into_iter()
        .fold(PageQuery::default().on_page(1, args.page_size), |query, (key, value)| {
            query.with_filter(key, value)
        });

    let api = Arc::new(InMemoryLeadApi::new(leads));
    let mut view = LiveView::new(api, query, config.feed, Arc::new(SystemClock));
    view.load().await.context("Initial page load failed")?;

    let mut duplicates = 0;
    let mut deferred = 0;
    for event in &recorded.events {
        let report = view.ingest(event);
        duplicates += usize::from(report.duplicate);
        deferred += report.deferred.len();
    }
    let reconciled = view.snapshot();

    let resynced = if args.resync {
        while view.resync_pending() {
            tokio::select! {
                _ = tokio::time::sleep_until(view.next_wakeup()) => {
                    view.tick().await.context("Re-sync failed")?;
                }
                _ = tokio::signal::ctrl_c() => bail!("Interrupted while waiting for re-sync"),
            }
        }
        Some(view.snapshot())
    } else {
        None
    };

    print_json(&ReplayOutput {
        events: recorded.events.len(),
        duplicates,
        deferred,
        decode_errors: recorded.errors.iter().map(ToString::to_string).collect(),
        reconciled,
        resynced,
        notices: view.drain_notices(),
    })
}

/// Typed values, falling back to the last-used mode and agent list.
fn build_request(
    pool_size: usize,
    args: &DistributionArgs,
    saved: &Preferences,
) -> Result<AllocationRequest> {
    let mode = args.mode.or(saved.last_mode).unwrap_or_default();
    let agents = if args.agents.is_empty() {
        saved
            .agents
            .iter()
            .map(|agent_id| AgentShare::new(agent_id.clone(), 0.0))
            .collect()
    } else {
        args.agents.clone()
    };
    if agents.is_empty() {
        bail!("At least one --agent is required");
    }

    if args.equal {
        let ids = agents
            .iter()
            .map(|share| share.agent_id.clone())
            .collect::<Vec<_>>();
        return Ok(distribute_equally(pool_size, &ids, mode));
    }
    Ok(AllocationRequest {
        pool_size,
        mode,
        agents,
    })
}

fn remember(config: &Config, request: &AllocationRequest) {
    prefs::save(
        &config.state_dir,
        &Preferences {
            last_mode: Some(request.mode),
            agents: request.agent_ids(),
        },
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{payload}");
    Ok(())
}

fn parse_agent(raw: &str) -> Result<AgentShare, String> {
    let (agent_id, value) = match raw.split_once('=') {
        Some((agent_id, value)) => (agent_id.trim(), value.trim()),
        None => (raw.trim(), "0"),
    };
    if agent_id.is_empty() {
        return Err(format!("missing agent id in '{raw}'"));
    }
    let value = value
        .parse::<f64>()
        .map_err(|err| format!("invalid value for agent {agent_id}: {err}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("value for agent {agent_id} must be zero or more"));
    }
    Ok(AgentShare::new(agent_id, value))
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}
