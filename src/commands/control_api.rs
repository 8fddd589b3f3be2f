//! HTTP control surface
//!
//! `GET /health` answers `{"status": "ok"}`. `POST /descargar?tipo=...`
//! dispatches a background sweep and returns at once; an unknown `tipo` is
//! answered with an error body (still HTTP 200) and dispatches nothing.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::SweepLauncher;
use crate::domain::SweepKind;

pub const MSG_CATEGORIES_STARTED: &str = "Descarga de categorías iniciada en segundo plano.";
pub const MSG_COUNTRIES_STARTED: &str = "Descarga por país iniciada en segundo plano.";
pub const MSG_INVALID_KIND: &str = "Tipo no válido. Usa 'categorias' o 'paises'.";

/// Shared state of the control router
#[derive(Clone)]
pub struct ControlState {
    pub launcher: Arc<dyn SweepLauncher>,
}

impl ControlState {
    pub fn new(launcher: Arc<dyn SweepLauncher>) -> Self {
        Self { launcher }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    /// Defaults to `categorias` when absent
    pub tipo: Option<String>,
}

pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/descargar", post(start_download))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn start_download(
    State(state): State<ControlState>,
    Query(params): Query<DownloadParams>,
) -> Json<Value> {
    let tipo = params.tipo.as_deref().unwrap_or(SweepKind::Categorias.as_str());

    let kind = match tipo.parse::<SweepKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!("Rejected download request: {}", e);
            return Json(json!({ "error": MSG_INVALID_KIND }));
        }
    };

    // Detached: the handle is dropped and the sweep keeps running
    drop(state.launcher.launch(kind));
    info!("📨 Download request accepted: {}", kind);

    let msg = match kind {
        SweepKind::Categorias => MSG_CATEGORIES_STARTED,
        SweepKind::Paises => MSG_COUNTRIES_STARTED,
    };
    Json(json!({ "msg": msg }))
}
