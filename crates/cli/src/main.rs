// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use termbridge::config::{Config, LogFormat};
use termbridge::hub::Hub;
use termbridge::pty::NativeSpawner;
use termbridge::registry::{RegistrySettings, SessionRegistry};
use termbridge::screenshot::platform_capture;
use termbridge::transport::events::run_event_pump;
use termbridge::transport::state::{AppState, BridgeSettings};
use termbridge::transport::build_router;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }

    init_tracing(&config);

    match run(config).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format() {
        Ok(LogFormat::Json) => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let classifier = Arc::new(config.classifier()?);
    let settings = RegistrySettings {
        shell: config.shell(),
        shell_args: config.shell_args.clone(),
        default_cwd: config.default_cwd(),
        env: config.child_env(),
        cols: config.cols,
        rows: config.rows,
        idle_timeout: config.idle_timeout(),
        kill_grace: config.kill_grace(),
    };
    let (registry, events_rx) = SessionRegistry::new(Arc::new(NativeSpawner), classifier, settings);
    let registry = Arc::new(registry);

    // The startup session exists before the first client can connect.
    registry
        .create(Some(config.session_name.clone()), None)
        .context("failed to start the initial session")?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("bind {addr}"))?;
    let local = listener.local_addr()?;

    let app_state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        hub: Arc::new(Hub::new()),
        screenshot: platform_capture(config.screenshot_cmd.as_deref()),
        config: BridgeSettings {
            port: local.port(),
            started_at: Instant::now(),
            screenshot_timeout: config.screenshot_timeout(),
        },
        shutdown: shutdown.clone(),
    });

    let pump = tokio::spawn(run_event_pump(Arc::clone(&app_state), events_rx));

    // Spawn signal handler
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM");
                    sd.cancel();
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT");
                    sd.cancel();
                }
            }
        });
    }

    info!(
        addr = %local,
        shell = %registry.settings().shell,
        cwd = %registry.settings().default_cwd.display(),
        "bridge listening"
    );
    let router = build_router(Arc::clone(&app_state));
    let result = axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await;
    if let Err(e) = result {
        error!("HTTP server error: {e}");
    }

    shutdown.cancel();
    let _ = pump.await;
    registry.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
