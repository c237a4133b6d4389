// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `unityctld`: the bridge daemon binary. Binds an HTTP listener for local
//! CLI/agent clients, accepts one editor peer over WebSocket, and survives
//! editor domain reloads within a grace period.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use unityctl_core::SystemClock;
use unityctl_daemon::bridge::BridgeHandle;
use unityctl_daemon::identity::ProjectIdentity;
use unityctl_daemon::{env, error::StartupError, http, lifecycle};

#[derive(Parser, Debug)]
#[command(name = "unityctld", about = "Local control-plane bridge between agent clients and the Unity Editor")]
struct Cli {
    /// Path to the Unity Editor project. Defaults to the current directory.
    #[arg(long, env = "UNITYCTL_PROJECT")]
    project: Option<PathBuf>,

    /// Port to bind. 0 picks an ephemeral port.
    #[arg(long, default_value_t = 0, env = "UNITYCTL_PORT")]
    port: u16,

    /// Path to a log file. Overrides `UNITYCTL_LOG_FILE`.
    #[arg(long, env = "UNITYCTL_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _file_guard = init_tracing(cli.log_file.clone());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_file: Option<PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let directory = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "unityctld.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
            None
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let project = match cli.project {
        Some(path) => path,
        None => std::env::current_dir().map_err(StartupError::Io)?,
    };
    let project = lifecycle::validate_project(&project)?;
    let project_id = ProjectIdentity::from_path(&project);

    let listener = lifecycle::bind(cli.port).await?;
    let bound_port = listener.local_addr().map_err(StartupError::Bind)?.port();

    let handle = Arc::new(BridgeHandle::new(
        project_id.clone(),
        SystemClock,
        env::log_capacity(),
        env::log_subscription_capacity(),
    ));
    let _deadline_watcher = handle.reload.spawn_deadline_watcher(handle.requests.clone(), handle.waiters.clone());

    lifecycle::write_handshake(&project, &project_id, bound_port)?;
    tracing::info!(project_id = %project_id, port = bound_port, "unityctld listening");

    let app = http::router(handle.clone());
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = served.await {
        tracing::warn!(%err, "server exited with an error");
    }

    lifecycle::shutdown(handle).await;
    lifecycle::remove_handshake(&project);
    tracing::info!("unityctld shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => tracing::warn!(%err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
