//! nakama CLI.
//!
//! Mounts a friends session over a fixture graph, runs one command, and
//! prints the settled snapshot as JSON on stdout.
//!
//! Usage:
//!   nakama crates/nakama-cli/fixtures/demo.json
//!   nakama fixtures/demo.json accept <from>
//!   nakama --log debug fixtures/demo.json block <id>

mod fixture;

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt};

use nakama_client::{
    BlockSignals, ClientConfig, Collaborators, FriendsSession, LogNotifier, NoSelection,
};
use nakama_store::MemoryStore;
use nakama_types::Identity;

use fixture::{Fixture, FixtureWorld};

/// Friends view over a fixture social graph.
#[derive(Parser, Debug)]
#[command(name = "nakama")]
#[command(about = "Run the nakama friends session against a fixture graph")]
struct Args {
    /// Client config (RON). Defaults to the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `nakama_client=trace`. Overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,

    /// Fixture JSON with the local identity, store nodes and block lists
    fixture: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Print the snapshot (default)
    Show,
    /// Accept the pending request from an identity
    Accept { from: Identity },
    /// Reject the pending request from an identity
    Reject { from: Identity },
    /// Block an identity at user and chat level
    Block { id: Identity },
    /// Lift both blocks on an identity
    Unblock { id: Identity },
    /// Resolve the display name of any identity
    Resolve { id: Identity },
}

fn init_tracing(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter {directives:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log.as_deref())?;

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::load_default()?,
    };
    let fixture = Fixture::load(&args.fixture)?;
    let command = args.command.unwrap_or(Command::Show);

    // The session is !Send and spawns local tasks.
    let local_set = tokio::task::LocalSet::new();
    let output = local_set.run_until(run(config, fixture, command)).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(config: ClientConfig, fixture: Fixture, command: Command) -> Result<serde_json::Value> {
    let store = MemoryStore::new();
    fixture.seed(&store)?;

    let world = Rc::new(FixtureWorld::new(store.clone(), config.layout(), &fixture));
    let collaborators = Collaborators {
        store: Rc::new(store),
        friends: world.clone(),
        users: world.clone(),
        chats: world,
        notifier: Rc::new(LogNotifier),
        selection: Rc::new(NoSelection),
        signals: BlockSignals::new(config.signal_capacity),
    };

    let session = FriendsSession::mount(&config, fixture.local.clone(), collaborators)?;
    session.settle().await;
    tracing::info!(?command, "running");

    match command {
        Command::Show => {}
        Command::Accept { from } => {
            let cleanup = session.accept(&from).await?;
            report_cleanup(cleanup.wait().await);
        }
        Command::Reject { from } => {
            let cleanup = session.reject(&from).await?;
            report_cleanup(cleanup.wait().await);
        }
        Command::Block { id } => session.block(&id).await?,
        Command::Unblock { id } => session.unblock(&id).await?,
        Command::Resolve { id } => {
            let name = session.resolve_display_name(&id).await;
            return Ok(json!({ "identity": id, "display_name": name }));
        }
    }

    session.settle().await;
    let snapshot = session.snapshot();
    session.teardown();
    Ok(serde_json::to_value(&*snapshot)?)
}

fn report_cleanup(report: Option<nakama_client::CleanupReport>) {
    match report {
        Some(report) if report.is_clean() => {
            tracing::debug!(removed = report.removed.len(), "request records purged");
        }
        Some(report) => {
            tracing::warn!(failed = report.failures.len(), "some request records were left behind");
        }
        None => tracing::warn!("request cleanup did not finish"),
    }
}
