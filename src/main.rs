use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use intervention_agent::config::ConfigStore;
use intervention_agent::{config::ConfigWatcher, http, rpc, AppContext};

#[derive(Parser)]
#[command(name = "intervention-agentd", about = "Interactive feedback daemon", version)]
struct Args {
    /// Override the HTTP surface bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP surface bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Override `feedback.timeout` (seconds).
    #[arg(long)]
    timeout: Option<u64>,

    /// Raise the log level to debug. Repeat for trace.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8, log_file: Option<&std::path::Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("intervention_agent={level},tower_http=info")));

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("intervention-agent.log"));

        if std::fs::create_dir_all(dir).is_err() {
            eprintln!("warn: could not create log directory '{}', falling back to stdout", dir.display());
            tracing_subscriber::fmt().with_env_filter(filter).compact().init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).compact().init();
        None
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = intervention_agent::config::resolve_path()
        .context("could not locate or create config.jsonc")?;
    let store = ConfigStore::load(config_path);

    let _log_guard = init_tracing(args.verbose, store.snapshot().logging.file.as_deref().map(std::path::Path::new));

    let watcher = ConfigWatcher::spawn(store.clone());
    if watcher.is_none() {
        tracing::warn!("hot-reload disabled for this run; edits to config.jsonc require a restart");
    }

    // CLI flags override the bind address and overall timeout for this
    // process only — they are never written back to config.jsonc.
    let config_snapshot = store.snapshot();
    let bind_host = args.host.clone().unwrap_or_else(|| config_snapshot.web_ui.host.clone());
    let bind_port = args.port.unwrap_or(config_snapshot.web_ui.port);

    let ctx = AppContext::new("intervention-agent", store);
    if let Some(timeout) = args.timeout {
        tracing::info!(timeout, "overriding feedback.timeout for this run via --timeout");
        ctx.override_timeout(timeout);
    }

    let addr: SocketAddr = format!("{bind_host}:{bind_port}")
        .parse()
        .with_context(|| format!("invalid bind address {bind_host}:{bind_port}"))?;

    let router = http::build_router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind HTTP listener on {addr}"))?;
    tracing::info!(%addr, "HTTP surface listening");

    let http_server = tokio::spawn(async move {
        if let Err(err) = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        {
            tracing::error!(error = %err, "HTTP server exited with error");
        }
    });

    let rpc_ctx = ctx.clone();
    let rpc_loop = tokio::spawn(async move {
        rpc::run(rpc_ctx, shutdown_signal()).await;
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining outstanding work");

    ctx.scheduler.disarm_all().await;
    let tasks = ctx.queue.list().await;
    for task in tasks {
        ctx.rendezvous.cancel(&task.id).await;
    }

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), http_server).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), rpc_loop).await;

    drop(watcher);
    Ok(())
}
