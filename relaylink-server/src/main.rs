use clap::Parser;
use relaylink_server::config::{RelayArgs, RelayConfig};
use relaylink_server::{RelayError, RelayState, run_gc_task, run_stats_task, serve};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = RelayArgs::parse();
    let config = match RelayConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.bind_address).await {
        Ok(listener) => listener,
        Err(source) => {
            let err = RelayError::Bind {
                address: config.bind_address.clone(),
                source,
            };
            error!("{}", err);
            std::process::exit(1);
        }
    };

    info!("relay starting on {}", config.bind_address);

    let state = RelayState::new();
    tokio::spawn(run_gc_task(state.clone(), config.clone()));
    tokio::spawn(run_stats_task(state.clone(), config.clone()));

    tokio::select! {
        result = serve(listener, state) => {
            if let Err(err) = result {
                warn!("relay server exited: {}", err);
            }
        }
        () = shutdown_signal() => {
            info!("signal received, shutting down");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
