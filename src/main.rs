//! Menu Ingest - turns a photo of a printed menu into a categorized digital menu.

mod categorize;
mod completion;
mod config;
mod error;
mod mapper;
mod pipeline;
mod repository;
mod schema;
mod shape;
mod vision;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use completion::CompletionClient;
use config::AnalyzerConfig;
use error::{AnalysisError, ErrorCause};
use pipeline::{Analyzer, MenuFile};
use repository::{InMemoryMenuRepository, MenuRepository};
use schema::{MenuAnalysis, StructuredMenu};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vision::HttpVisionService;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    analyzer: Analyzer,
    menus: Arc<dyn MenuRepository>,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "menu_ingest=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AnalyzerConfig::load()?;

    let vision_http = reqwest::Client::builder()
        .timeout(config.vision_timeout())
        .build()?;
    let completion_http = reqwest::Client::builder()
        .timeout(config.completion_timeout())
        .build()?;

    let vision = HttpVisionService::new(vision_http, &config.vision_url);
    let completion = CompletionClient::new(
        completion_http,
        &config.completion_url,
        &config.completion_api_key,
        &config.completion_model,
    )
    .with_json_mode(config.json_mode);
    info!(
        "Vision service: {}, completion model: {}",
        config.vision_url,
        completion.model()
    );

    let state = AppState {
        analyzer: Analyzer::new(Arc::new(vision), Arc::new(completion)),
        menus: Arc::new(InMemoryMenuRepository::new()),
    };

    let app = router(state, config.max_upload_bytes());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/menus/analyze", post(analyze_menu))
        .route("/menus/:id", get(get_menu))
        .route("/venues/:venue_id/menu", post(create_venue_menu).get(get_venue_menu))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Analyze an uploaded menu photo without storing it.
async fn analyze_menu(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MenuAnalysis>, ApiError> {
    let file = read_menu_file(multipart).await?;
    let analysis = state
        .analyzer
        .analyze(file)
        .await
        .map_err(analysis_error_response)?;
    Ok(Json(analysis))
}

/// Analyze an uploaded menu photo and store it as the venue's menu.
async fn create_venue_menu(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<MenuAnalysis>, ApiError> {
    let file = read_menu_file(multipart).await?;
    let handle = state.analyzer.start(file);
    let analysis = handle.outcome().await.map_err(analysis_error_response)?;

    let stored = state
        .menus
        .create_menu(analysis, &venue_id)
        .await
        .map_err(|e| {
            error!("Failed to store menu for venue {}: {}", venue_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to store menu: {}", e))
        })?;

    info!(
        "Stored menu {} for venue {}",
        stored.id.as_deref().unwrap_or_default(),
        venue_id
    );
    Ok(Json(stored))
}

async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MenuAnalysis>, ApiError> {
    state
        .menus
        .get_menu(&id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("Menu not found: {}", id)))
}

async fn get_venue_menu(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
) -> Result<Json<StructuredMenu>, ApiError> {
    state
        .menus
        .menu_for_venue(&venue_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("No menu for venue: {}", venue_id)))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Read the `menuFile` (or `file`) field of a multipart upload.
async fn read_menu_file(mut multipart: Multipart) -> Result<MenuFile, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let field_name = field.name().unwrap_or_default().to_string();
        if matches!(field_name.as_str(), "menuFile" | "file") {
            let filename = field.file_name().unwrap_or("menu.jpg").to_string();
            let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
            let data = field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;

            if data.is_empty() {
                debug!("Skipping empty '{}' part", field_name);
                continue;
            }

            info!("Received menu file: {} ({} bytes, {})", filename, data.len(), content_type);
            return Ok(MenuFile::from_bytes(filename, content_type, data.to_vec()));
        }
    }

    Err((StatusCode::BAD_REQUEST, "No menu file uploaded".to_string()))
}

fn status_for(cause: ErrorCause) -> StatusCode {
    match cause {
        ErrorCause::VisionTransport
        | ErrorCause::VisionDecode
        | ErrorCause::LlmTransport
        | ErrorCause::LlmDecode => StatusCode::BAD_GATEWAY,
        ErrorCause::ResultParse => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCause::Interrupted => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn analysis_error_response(err: AnalysisError) -> ApiError {
    error!("Error analyzing menu file: {}", err);
    (
        status_for(err.cause()),
        format!("Could not analyze menu: {}", err),
    )
}
