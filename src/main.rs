#![forbid(unsafe_code)]

//! `hub-orchestrator` — agent liveness supervisor daemon.
//!
//! Bootstraps configuration, wires the project store, tmux backend and
//! event bus into the orchestration cycle, then runs it on a fixed
//! interval alongside the observability HTTP endpoint and the IPC server
//! for `hub-orchestrator-ctl`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use hub_orchestrator::backend::tmux::TmuxBackend;
use hub_orchestrator::backend::SessionBackend;
use hub_orchestrator::bus::consumer::spawn_event_logger;
use hub_orchestrator::bus::BroadcastBus;
use hub_orchestrator::config::{GlobalConfig, StoreKind};
use hub_orchestrator::ipc::server::{spawn_ipc_server, IpcState};
use hub_orchestrator::orchestrator::clock::SystemClock;
use hub_orchestrator::orchestrator::cycle::OrchestrationCycle;
use hub_orchestrator::orchestrator::scheduler::spawn_cycle_loop;
use hub_orchestrator::persistence::db;
use hub_orchestrator::persistence::project_repo::ProjectRepo;
use hub_orchestrator::store::hub_api::HubApiStore;
use hub_orchestrator::store::StateStore;
use hub_orchestrator::{http, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "hub-orchestrator", about = "Agent liveness supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run a single tick, print the fleet summary as JSON and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("hub-orchestrator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    info!(
        interval_seconds = config.cycle.interval_seconds,
        store = ?config.store.kind,
        "configuration loaded"
    );

    // ── Wire collaborators ──────────────────────────────
    let store = build_store(&config).await?;
    let backend: Arc<dyn SessionBackend> = Arc::new(TmuxBackend::from_config(&config.backend));
    let bus = Arc::new(BroadcastBus::default());
    let events = bus.subscribe();

    let mut cycle = OrchestrationCycle::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&backend),
        bus,
        Arc::new(SystemClock),
    )?;

    if args.once {
        let summary = cycle.run_tick().await?;
        let rendered = serde_json::to_string_pretty(&summary)
            .map_err(|err| AppError::Io(format!("failed to render summary: {err}")))?;
        println!("{rendered}");
        return Ok(());
    }

    let ct = CancellationToken::new();
    let summary = cycle.summary_handle();

    // ── Background services ─────────────────────────────
    let logger_handle = spawn_event_logger(events, ct.clone());

    let http_handle = if config.http.enabled {
        let http_ct = ct.clone();
        let http_summary = summary.clone();
        let port = config.http.port;
        Some(tokio::spawn(async move {
            if let Err(err) = http::serve_http(port, http_summary, http_ct).await {
                error!(%err, "http endpoint failed");
            }
        }))
    } else {
        info!("http endpoint disabled");
        None
    };

    let ipc_state = Arc::new(IpcState {
        store,
        backend,
        summary,
        auth_token: config.ipc.auth_token.clone(),
        session_prefix: config.cycle.session_prefix.clone(),
        call_timeout: config.cycle.call_timeout(),
    });
    let ipc_handle = match spawn_ipc_server(&config.ipc.name, ipc_state, ct.clone()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(%err, "ipc server unavailable");
            None
        }
    };

    // ── Orchestration loop ──────────────────────────────
    let loop_handle = spawn_cycle_loop(cycle, config.cycle.interval(), ct.clone());
    info!("hub-orchestrator ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    match loop_handle.await {
        Ok(cycle) => info!(ticks = cycle.ticks(), "orchestration loop stopped"),
        Err(err) => error!(%err, "orchestration loop panicked"),
    }
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    if let Some(handle) = ipc_handle {
        let _ = handle.await;
    }
    let _ = logger_handle.await;

    info!("hub-orchestrator shut down");
    Ok(())
}

async fn build_store(config: &GlobalConfig) -> Result<Arc<dyn StateStore>> {
    match config.store.kind {
        StoreKind::Sqlite => {
            let pool = db::connect(&config.store.db_path).await?;
            info!(path = %config.store.db_path.display(), "database connected");
            Ok(Arc::new(ProjectRepo::new(Arc::new(pool))))
        }
        StoreKind::HubApi => {
            let url = config
                .store
                .hub_url
                .as_deref()
                .ok_or_else(|| AppError::Config("store.hub_url is not set".into()))?;
            info!(url, "using hub api store");
            Ok(Arc::new(HubApiStore::new(url)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
