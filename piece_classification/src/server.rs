use crate::{
    config::{Config, ServerConfig},
    model_service::Classifier,
    ort_service::OrtClassifier,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct SharedState {
    pub classifier: Arc<dyn Classifier>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        classifier: Arc<dyn Classifier>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);
        let state = SharedState {
            classifier,
            metrics,
        };

        let router = build_router(state, config.max_body_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!(
            "Classification service listening on {}",
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
    let classifier = OrtClassifier::new(&config.model)?;
    tracing::info!(
        "Model loaded, serving {} classes",
        crate::labels::NUM_CLASSES
    );

    let server = HttpServer::new(Arc::new(classifier), &config.server).await?;
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
