// Pokedex Reconciliation - Web Server
// Read-only REST API over the reconciled store

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pokedex_recon::{
    AbilityRecord, AppConfig, CreatureRecord, DataQualityEngine, DexNumber, GameRecord, Query,
    QualityReport, Store,
};

/// Shared application state (the store is loaded once and never written)
#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Ability with its holders resolved to names
#[derive(Serialize)]
struct AbilityResponse<'a> {
    #[serde(flatten)]
    ability: &'a AbilityRecord,
    holder_names: Vec<&'a str>,
}

fn not_found(message: String) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<CreatureRecord>::err(message)),
    )
        .into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/creatures - All creatures in id order
async fn get_creatures(State(state): State<AppState>) -> impl IntoResponse {
    let creatures: Vec<&CreatureRecord> = state.store.creatures.values().collect();
    Json(ApiResponse::ok(creatures)).into_response()
}

/// GET /api/creatures/:id - One creature by national dex number
async fn get_creature(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let query = Query::new(&state.store);

    match DexNumber::parse(&id).and_then(|id| query.by_id(id)) {
        Some(creature) => (StatusCode::OK, Json(ApiResponse::ok(creature))).into_response(),
        None => not_found(format!("no creature with id '{}'", id)),
    }
}

/// GET /api/creatures/by-name/:name - Case-insensitive exact name match
async fn get_creature_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    // Decode URL-encoded name ("Mr.%20Mime")
    let decoded = urlencoding::decode(&name)
        .unwrap_or_else(|_| name.clone().into())
        .into_owned();

    match Query::new(&state.store).by_name(&decoded) {
        Some(creature) => (StatusCode::OK, Json(ApiResponse::ok(creature))).into_response(),
        None => not_found(format!("no creature named '{}'", decoded)),
    }
}

/// GET /api/games - Game reference set
async fn get_games(State(state): State<AppState>) -> impl IntoResponse {
    let games: Vec<&GameRecord> = Query::new(&state.store).games();
    Json(ApiResponse::ok(games)).into_response()
}

/// GET /api/abilities - Abilities with holder names
async fn get_abilities(State(state): State<AppState>) -> impl IntoResponse {
    let abilities: Vec<AbilityResponse> = Query::new(&state.store)
        .abilities_with_holders()
        .into_iter()
        .map(|(ability, holders)| AbilityResponse {
            ability,
            holder_names: holders.iter().filter_map(|c| c.name()).collect(),
        })
        .collect();

    Json(ApiResponse::ok(abilities)).into_response()
}

/// GET /api/quality - Data quality report for the whole store
async fn get_quality(State(state): State<AppState>) -> impl IntoResponse {
    let report: QualityReport = DataQualityEngine::new().check_store(&state.store);
    Json(ApiResponse::ok(report)).into_response()
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/creatures", get(get_creatures))
        .route("/creatures/by-name/:name", get(get_creature_by_name))
        .route("/creatures/:id", get(get_creature))
        .route("/games", get(get_games))
        .route("/abilities", get(get_abilities))
        .route("/quality", get(get_quality))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🌐 Pokedex Reconciliation - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if !config.store_path.exists() {
        eprintln!("❌ Store not found at {:?}", config.store_path);
        eprintln!("   Run: pokedex-recon import --web <json> --sheet <csv>");
        eprintln!("   to build the store first.");
        std::process::exit(1);
    }

    let store = match config.store_manager().load() {
        Ok(store) => store,
        Err(e) => {
            error!(%e, "failed to load store");
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    println!("✓ Store loaded: {} creatures", store.len());

    let app = router(AppState {
        store: Arc::new(store),
    });

    let addr = std::env::var("POKEDEX_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!(%addr, "serving");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/creatures", addr);
    println!("\n   Press Ctrl+C to stop\n");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// TESTS
// ============================================================================
