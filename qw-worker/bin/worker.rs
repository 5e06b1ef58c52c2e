//! Binary entry point. A process with no `QW_WORKER_INDEX` env var and
//! `--workers > 1` acts as a supervisor: it re-execs itself once per
//! requested worker and waits, never serving itself. Every other
//! invocation — `--workers 1`, or a re-exec'd child — runs the actual
//! TCP server for one worker index. Grounded on the teacher's
//! `main.rs`: mimalloc as global allocator, logging/panic hook set up
//! first, Prometheus exporter installed early, a warp readiness/liveness
//! pair spawned alongside the main loop.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use qw_handlers::domain::shell::ShellDomainTaskResolver;
use qw_handlers::examples::default_registry;
use qw_discovery::DiscoveryHandle;
use qw_registry::RegistryClient;
use qw_worker::cli::Cli;
use qw_worker::cli::WORKER_INDEX_ENV_VAR;
use qw_worker::config::Config;
use qw_worker::identity;
use qw_worker::limits;
use qw_worker::logging;
use qw_worker::metrics::Metrics;
use qw_worker::registration::Registration;
use qw_worker::server::WorkerServer;
use qw_worker::supervisor::Supervisor;
use tracing::error;
use tracing::info;
use tracing::warn;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const LIVENESS_CHECK_INTERVAL_SECS: u64 = 60;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(cli.json, cli.debug);
    logging::install_panic_hook();

    let config = Config::load(cli.config.clone());
    config.validate();

    if let Err(err) = limits::raise_nofile(config.worker.nofiles) {
        warn!(error = %err, "failed to raise file descriptor limit");
    }

    // `default_qty` (WORKER_DEFAULT_QTY) sizes the blocking pool that
    // backs each immediate-mode call's isolated runtime (engine::
    // execute_func_isolated); building the runtime by hand here, rather
    // than via `#[tokio::main]`, is what lets that config value actually
    // reach it.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.worker.default_qty)
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to build the tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let worker_index: Option<u32> = std::env::var(WORKER_INDEX_ENV_VAR)
        .ok()
        .and_then(|value| value.parse().ok());

    runtime.block_on(async {
        match worker_index {
            None if cli.workers > 1 => run_supervisor(&cli).await,
            other => run_worker(&cli, config, other.unwrap_or(0)).await,
        }
    })
}

async fn run_supervisor(cli: &Cli) -> ExitCode {
    info!(workers = cli.workers, "starting supervisor");
    let mut supervisor = match Supervisor::spawn(cli.workers) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(error = %err, "failed to spawn worker processes");
            return ExitCode::FAILURE;
        }
    };

    let result = tokio::signal::ctrl_c().await.context("waiting for ctrl_c");
    supervisor.shutdown();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "supervisor wait failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_worker(cli: &Cli, config: Config, worker_id: u32) -> ExitCode {
    match serve(cli, config, worker_id).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("worker exited due to an error: {:?}", err);
            ExitCode::FAILURE
        }
    }
}

async fn serve(cli: &Cli, config: Config, worker_id: u32) -> anyhow::Result<()> {
    let host = cli.host.clone().unwrap_or(config.worker.host.clone());
    let port = cli.port.unwrap_or(config.worker.port);
    // clap's default makes "--wkname qw" indistinguishable from not
    // passing the flag; fall back to the config value only in that case.
    let base_name = if cli.wkname != "qw" {
        cli.wkname.clone()
    } else {
        config.worker.wkname.clone()
    };

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.prometheus.port))
        .install()
        .context("setting up Prometheus")?;

    let announce_host = identity::resolve_announce_host(&host);
    let worker_identity = identity::build_identity(&base_name, announce_host, port, worker_id);

    info!(
        worker = %worker_identity.name,
        pid = worker_identity.pid,
        "starting worker"
    );

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    let handlers = Arc::new(default_registry());
    let resolver = Arc::new(ShellDomainTaskResolver::new(Vec::new()));
    let metrics = Arc::new(Metrics::new());

    let server = Arc::new(WorkerServer::new(
        worker_identity.clone(),
        addr,
        config.worker.queue_size,
        config.worker.queue_size as u32,
        handlers,
        resolver,
        metrics.clone(),
    ));

    let listener = server.bind().context("binding worker TCP listener")?;

    let registry = match RegistryClient::connect(&config.registry.url, config.registry.list_key.clone()).await {
        Ok(client) => Some(client),
        Err(err) => {
            metrics.increment_registry_errors();
            warn!(error = %err, "registry unavailable, continuing without it");
            None
        }
    };
    let discovery = DiscoveryHandle::bind_or_fallback(config.discovery.port).await;
    let registration = Arc::new(Registration::new(
        registry,
        discovery,
        worker_identity.clone(),
        metrics,
    ));
    registration.announce().await;

    let last_activity = Arc::new(AtomicU64::new(now_secs()));
    spawn_health_routes(config.prometheus.port + 1, last_activity.clone());

    let serving = tokio::spawn(server.clone().serve(listener));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl_c")?;
    info!(worker = %worker_identity.name, "shutdown requested");

    server.begin_draining();
    registration.deregister().await;
    serving.abort();
    Ok(())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Readiness/liveness HTTP routes, grounded on the teacher's `main.rs`
/// `warp` setup. Offset from the Prometheus port so both can coexist
/// without a configuration entry of their own. Liveness reports healthy
/// as long as the process started within the last check interval or has
/// served a request since; `last_activity` is a hook future dispatch
/// code can bump, currently only stamped at startup.
fn spawn_health_routes(port: u16, last_activity: Arc<AtomicU64>) {
    tokio::spawn(async move {
        use warp::Filter;
        let readiness_route =
            warp::path!("readiness").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));
        let liveness_route = warp::path!("liveness").map(move || {
            let last = last_activity.load(Ordering::Relaxed);
            if now_secs().saturating_sub(last) <= LIVENESS_CHECK_INTERVAL_SECS {
                warp::reply::with_status("OK", warp::http::StatusCode::OK)
            } else {
                warp::reply::with_status("FAIL", warp::http::StatusCode::INTERNAL_SERVER_ERROR)
            }
        });
        let routes = readiness_route.or(liveness_route);
        warp::serve(routes).run(([0, 0, 0, 0], port)).await;
    });
}
