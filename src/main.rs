//! Ragserve HTTP server entrypoint.

use std::net::SocketAddr;
use std::process::ExitCode;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ragserve::app::{Adapters, build_state, log_file_path, spawn_maintenance};
use ragserve::config::Config;
use ragserve::gateway::create_router;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    // --no-check skips startup validators only; the middleware stack is
    // never optional.
    let skip_checks = std::env::args().any(|arg| arg == "--no-check");
    if skip_checks {
        eprintln!("startup validators skipped (--no-check)");
    } else if let Err(e) = config.validate() {
        eprintln!("configuration error: {e}");
        return ExitCode::from(1);
    }

    let runtime = {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if config.workers > 0 {
            builder.worker_threads(config.workers);
        }
        match builder.enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                eprintln!("failed to build runtime: {e}");
                return ExitCode::from(1);
            }
        }
    };

    runtime.block_on(run(config))
}

async fn run(config: Config) -> ExitCode {
    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("cannot create log directory {}: {e}", config.log_dir.display());
        return ExitCode::from(1);
    }
    let file_appender = tracing_appender::rolling::never(
        &config.log_dir,
        log_file_path(&config)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ragserve.log".into()),
    );
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if config.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .init();

    config.warn_unknown_vars();

    tracing::info!(
        host = %config.host,
        port = config.port,
        working_dir = %config.working_dir.display(),
        "ragserve starting"
    );

    let addr: SocketAddr = match config.socket_addr().parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid bind address");
            return ExitCode::from(1);
        }
    };

    let adapters = Adapters::from_config(&config);
    let state = match build_state(config, adapters) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::from(1);
        }
    };
    spawn_maintenance(&state);

    let app = create_router(state);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind port");
            return ExitCode::from(2);
        }
    };
    tracing::info!(addr = %addr, "server listening");

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = serve.await {
        tracing::error!(error = %e, "server error");
        return ExitCode::from(1);
    }

    tracing::info!("ragserve shutdown complete");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
