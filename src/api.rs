//! REST API for the loan document pipeline
//!
//! Exposes document processing and what-if risk assessment over HTTP

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::compliance;
use crate::config::{ComplianceThresholds, GateConfig};
use crate::models::{Document, ExtractedData, MonthlySummary, TableFragment};
use crate::pipeline::{CancelFlag, Pipeline};
use crate::summary;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub text: String,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableFragment>,
    /// Per-request overrides; the pipeline's own configuration fills the gaps.
    pub thresholds: Option<ComplianceThresholds>,
    pub gate: Option<GateConfig>,
}

#[derive(Debug, Deserialize)]
pub struct AssessRequest {
    pub extracted_data: ExtractedData,
    /// When absent, summaries are derived from the transactions.
    pub monthly_summaries: Option<Vec<MonthlySummary>>,
    pub thresholds: Option<ComplianceThresholds>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Document Processing Endpoint
/// =============================

async fn process_document(
    State(state): State<ApiState>,
    Json(req): Json<ProcessRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Document text is empty".into())),
        );
    }

    info!(
        text_len = req.text.len(),
        page_count = req.pages.len(),
        "Received process request"
    );

    let document = Document {
        raw_text: req.text,
        pages: req.pages,
        tables: req.tables,
    };

    let mut config = state.pipeline.config().clone();
    if let Some(thresholds) = req.thresholds {
        config.thresholds = thresholds;
    }
    if let Some(gate) = req.gate {
        config.gate = gate;
    }

    let result = state
        .pipeline
        .process_with(document, CancelFlag::new(), &config)
        .await;

    // Failed runs still ship the full RunResult; the fault is inside it.
    (StatusCode::OK, Json(ApiResponse::success(result)))
}

/// =============================
/// What-if Assessment Endpoint
/// =============================

/// Recomputes the deterministic risk assessment for already-extracted data,
/// letting callers probe alternative thresholds without re-running the
/// model-backed stages.
async fn assess_extracted(
    State(state): State<ApiState>,
    Json(req): Json<AssessRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let config = state.pipeline.config();
    let thresholds = req.thresholds.unwrap_or_else(|| config.thresholds.clone());

    let summaries = match req.monthly_summaries {
        Some(s) => s,
        None => summary::summarize_by_month(
            &req.extracted_data.transactions,
            config.salary_credit_floor,
        ),
    };

    match compliance::assess(&req.extracted_data, &summaries, &thresholds) {
        Ok(assessment) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "risk_assessment": assessment,
                "monthly_summaries": summaries,
            }))),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Assessment failed: {}", e))),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<Pipeline>) -> Router {
    let state = ApiState { pipeline };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/process", post(process_document))
        .route("/api/assess", post(assess_extracted))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<Pipeline>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
