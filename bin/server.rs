// EGRUL Founder Tracker - Web Server
// Read-only REST API over the tracked companies with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use egrul_founders::{logging, Config, Event, FounderSet, PersistedRecord, SqliteStore, StateStore};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
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

/// Company response: stored columns with founder lines split out
#[derive(Serialize)]
struct CompanyResponse {
    inn: String,
    name: String,
    current_founders: Vec<String>,
    former_founders: Vec<String>,
    change_date: String,
}

impl From<PersistedRecord> for CompanyResponse {
    fn from(record: PersistedRecord) -> Self {
        Self {
            current_founders: FounderSet::parse(&record.current_founders).iter().cloned().collect(),
            former_founders: FounderSet::parse(&record.former_founders).iter().cloned().collect(),
            inn: record.inn,
            name: record.name,
            change_date: record.change_date,
        }
    }
}

fn internal_error<T: Serialize>(context: &str, e: impl std::fmt::Display) -> Response {
    log::error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<T>::err(format!("{}: {}", context, e))),
    )
        .into_response()
}

/// Run `f` against the store, mapping a poisoned lock to a 500
fn with_store<T, F>(state: &AppState, f: F) -> Result<T, Response>
where
    T: Serialize,
    F: FnOnce(&SqliteStore) -> anyhow::Result<T>,
{
    let store = state
        .store
        .lock()
        .map_err(|e| internal_error::<T>("Store lock poisoned", e))?;
    f(&store).map_err(|e| internal_error::<T>("Store query failed", format!("{:#}", e)))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/companies - All tracked companies in tracking order
async fn get_companies(State(state): State<AppState>) -> Response {
    match with_store(&state, |store| store.all_records()) {
        Ok(records) => {
            let response: Vec<CompanyResponse> = records.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(response) => response,
    }
}

/// GET /api/companies/:inn - One company
async fn get_company(State(state): State<AppState>, Path(inn): Path<String>) -> Response {
    match with_store(&state, |store| store.get_record(&inn)) {
        Ok(Some(record)) => {
            (StatusCode::OK, Json(ApiResponse::ok(CompanyResponse::from(record)))).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<CompanyResponse>::err(format!("INN {} is not tracked", inn))),
        )
            .into_response(),
        Err(response) => response,
    }
}

/// GET /api/companies/:inn/events - Audit trail of one company, newest first
async fn get_company_events(State(state): State<AppState>, Path(inn): Path<String>) -> Response {
    match with_store(&state, |store| store.events_for_company(&inn)) {
        Ok(events) => (StatusCode::OK, Json(ApiResponse::<Vec<Event>>::ok(events))).into_response(),
        Err(response) => response,
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/companies", get(get_companies))
        .route("/companies/:inn", get(get_company))
        .route("/companies/:inn/events", get(get_company_events))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("🌐 EGRUL Founder Tracker - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    if !config.database_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.database_path);
        eprintln!("   Run: egrul-founders import <csv>");
        eprintln!("   to track companies first.");
        std::process::exit(1);
    }

    let store = SqliteStore::open(&config.database_path)?;
    println!("✓ Database opened: {:?}", config.database_path);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };

    let addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/companies", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
