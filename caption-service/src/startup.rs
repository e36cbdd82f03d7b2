use crate::config::CaptionConfig;
use crate::handlers::{self, caption_upload_policy};
use axum::{extract::DefaultBodyLimit, routing::post, Router};
use service_core::error::AppError;
use service_core::genai::{GeminiConfig, GeminiTextProvider, GenerationParams, TextProvider};
use service_core::server::{operational_routes, shutdown_signal, with_standard_layers, ServiceInfo};
use service_core::upload::{UploadPolicy, UploadStore};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeFile;

pub const SERVICE_INFO: ServiceInfo = ServiceInfo {
    name: "caption-service",
    version: env!("CARGO_PKG_VERSION"),
};

/// Room for multipart boundaries and headers on top of the file cap.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: CaptionConfig,
    pub provider: Arc<dyn TextProvider>,
    pub uploads: UploadStore,
    pub upload_policy: UploadPolicy,
    pub generation_params: GenerationParams,
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let index = ServeFile::new(state.config.static_dir.join("index.html"));
    let provider = state.provider.clone();

    let app = Router::new()
        .route_service("/", index)
        .route("/generate-caption", post(handlers::generate_caption))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .merge(operational_routes(SERVICE_INFO, provider));

    with_standard_layers(app)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    /// Build the application with the Gemini provider from `config`.
    pub async fn build(config: CaptionConfig) -> Result<Self, AppError> {
        let provider = GeminiTextProvider::new(GeminiConfig::from(&config.genai)).map_err(|e| {
            tracing::error!("Failed to initialize Gemini provider: {}", e);
            AppError::ConfigError(anyhow::Error::new(e))
        })?;

        tracing::info!(model = %provider.model(), "Initialized Gemini text provider");

        Self::build_with_provider(config, Arc::new(provider)).await
    }

    /// Build the application around an already constructed model provider.
    pub async fn build_with_provider(
        config: CaptionConfig,
        provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        let uploads = UploadStore::new(&config.upload.dir).await.map_err(|e| {
            tracing::error!(
                "Failed to initialize upload directory {}: {}",
                config.upload.dir.display(),
                e
            );
            e
        })?;

        let state = AppState {
            upload_policy: caption_upload_policy(config.upload.max_bytes),
            generation_params: GenerationParams {
                temperature: config.genai.temperature,
                max_tokens: config.genai.max_output_tokens,
            },
            config: config.clone(),
            provider,
            uploads,
        };

        let app = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Caption service listening on http://localhost:{}", port);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
