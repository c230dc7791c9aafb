use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::adapters::{AdapterRegistry, TransferRequest};
use crate::error::{AppError, ErrorClass};
use crate::ledger::models::TxHash;
use crate::settlement::{simulate_deposit, StatusSnapshot};

pub type StatusReceiver = watch::Receiver<StatusSnapshot>;

#[derive(Clone)]
pub struct AppState {
    pub status: StatusReceiver,
    /// Present only when simulation is enabled
    pub adapters: Option<Arc<AdapterRegistry>>,
}

pub fn create_app(status: StatusReceiver, simulation: Option<Arc<AdapterRegistry>>) -> Router {
    info!("⚙️ Setting up status routes...");

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status));

    if simulation.is_some() {
        warn!("⚠️  Simulation enabled: POST /admin/simulate/:chain moves real funds");
        app = app.route("/admin/simulate/:chain", post(simulate));
    }

    let app = app.layer(TraceLayer::new_for_http()).with_state(AppState {
        status,
        adapters: simulation,
    });

    info!("✓ Status routes configured");
    app
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.class() {
            ErrorClass::Transient => StatusCode::BAD_GATEWAY,
            ErrorClass::Permanent => StatusCode::BAD_REQUEST,
            ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

pub async fn health_check() -> &'static str {
    "ok"
}

/// Latest snapshot published by the orchestrator
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status.borrow().clone())
}

#[derive(Debug, Serialize)]
pub struct SimulatedDeposit {
    pub hash: TxHash,
}

/// Send a test deposit from the relayer's own account on `chain`
pub async fn simulate(
    State(state): State<AppState>,
    Path(chain): Path<String>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<SimulatedDeposit>, AppError> {
    let adapters = state
        .adapters
        .ok_or_else(|| AppError::Configuration("simulation is disabled".to_string()))?;
    let hash = simulate_deposit(&adapters, &chain, &request).await?;
    Ok(Json(SimulatedDeposit { hash }))
}

/// Serve until `shutdown` flips to true or its sender is dropped
pub async fn run_server(
    app: Router,
    bind_address: &str,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Status server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("🛑 Status server shutting down");
        })
        .await
}
