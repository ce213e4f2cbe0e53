use clap::Parser;
use shutter_gateway::{bootstrap, App, Cli};
use shutter_telemetry::TelemetryConfig;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::try_parse()?;

    let telemetry = TelemetryConfig::builder()
        .service_name("shutter")
        .log_format(cli.log_format)
        .build();
    let telemetry = match &cli.otlp_endpoint {
        Some(endpoint) => TelemetryConfig {
            otlp_endpoint: Some(endpoint.clone()),
            ..telemetry
        },
        None => telemetry,
    };
    let _guard = shutter_telemetry::init(&telemetry)?;

    let state = bootstrap::build_state(&cli).await?;
    let app = App::router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen_addr).await?;
    info!(
        listen_addr = %listener.local_addr()?,
        cache = %cli.cache,
        serve_mode = %cli.serve_mode,
        "starting shutter gateway"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutter gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining connections");
}
