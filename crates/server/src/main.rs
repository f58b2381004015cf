//! Avatar Gateway Entry Point

use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use avatar_gateway_config::{load_settings, Protocol, Settings};
use avatar_gateway_inference::Engines;
use avatar_gateway_server::{create_router, init_metrics, AppState};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: the worker count sizes the runtime itself.
    let env = std::env::var("AVATAR_GATEWAY_ENV").ok();
    let settings = load_settings(env.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.transport.workers)
        .enable_all()
        .build()?;
    runtime.block_on(run(settings))
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(&settings);

    tracing::info!("Starting Avatar Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded configuration");

    if settings.transport.protocol == Protocol::H2 {
        // The gateway itself speaks clear-text; TLS-terminated HTTP/2 means
        // a terminating proxy sits in front and forwards h2c.
        tracing::info!("transport.protocol=h2: expecting TLS termination upstream");
    }

    if settings.observability.metrics_enabled {
        let _metrics_handle = init_metrics();
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    let engines = Engines::from_settings(&settings)?;
    let state = AppState::build(settings.clone(), engines.clone()).await?;
    tracing::info!("Initialized application state");

    // Readiness probe, retried until the inference engines answer.
    let probe_state = state.clone();
    tokio::spawn(async move {
        loop {
            match engines.healthcheck().await {
                Ok(()) => {
                    probe_state.set_models_loaded(true);
                    tracing::info!("Inference engines ready");
                    break;
                }
                Err(err) => {
                    tracing::warn!(%err, "Inference engines not ready, retrying in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    });

    let eviction_shutdown = state
        .store
        .start_eviction_task(Duration::from_secs(settings.asset_store.eviction_sweep_secs));

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {} ({:?})", addr, settings.transport.protocol);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // hyper's auto connection negotiates HTTP/2 (h2c via prior knowledge)
    // alongside HTTP/1.1 on the same listener.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = eviction_shutdown.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Initialize tracing with optional OpenTelemetry integration
///
/// When `observability.otlp_endpoint` is configured, traces are exported to
/// the specified OTLP collector.
fn init_tracing(settings: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("avatar_gateway={level},tower_http=info").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &settings.observability.otlp_endpoint {
        if settings.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(otlp_endpoint),
                )
                .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
                    opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "avatar-gateway"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    tracing::info!(
                        endpoint = %otlp_endpoint,
                        "OpenTelemetry tracing enabled, exporting to OTLP endpoint"
                    );
                    return;
                }
                Err(e) => {
                    eprintln!(
                        "Failed to initialize OpenTelemetry: {e}. Falling back to console logging."
                    );
                }
            }
        }
    }

    subscriber.with(fmt_layer).init();
}
