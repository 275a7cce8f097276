use crate::{
    config::{Config, ServerConfig},
    model_service::HandDetector,
    ort_service::OrtHandDetector,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct SharedState {
    pub detector: Arc<dyn HandDetector>,
    pub metrics: Arc<Metrics>,
    pub report_detector_score: bool,
}

pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        detector: Arc<dyn HandDetector>,
        report_detector_score: bool,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let state = SharedState {
            detector,
            metrics,
            report_detector_score,
        };

        let router = build_router(state, config.max_body_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            "Hand detection service listening on {}",
            self.listener.local_addr()?
        );

        let shutdown = async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown")
        };

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let detector = OrtHandDetector::new(&config.model)?;
    if !config.model.report_detector_score {
        tracing::warn!(
            "Reporting placeholder hand confidence (1.0 when found, 0.0 otherwise); \
             set model.report_detector_score to return detector scores"
        );
    }

    let server = HttpServer::new(
        Arc::new(detector),
        config.model.report_detector_score,
        &config.server,
    )
    .await?;
    server.run().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
