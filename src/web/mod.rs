//! HTTP surface over the endpoint controller.
//!
//! Every response body is either a serialized [`OperationResult`] or a
//! committed [`Record`], and the status code always follows the result's
//! [`StatusClass`](crate::result::StatusClass).

use crate::core::{EndpointError, Input, RecordId};
use crate::endpoint::EndpointController;
use crate::result::{OperationResult, ResultBuilder};
use crate::storage::RecordStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const HTTP_RESULTS: ResultBuilder = ResultBuilder::new("http");

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<EndpointController>,
    pub store: Arc<dyn RecordStore>,
}

impl AppState {
    pub fn new(controller: Arc<EndpointController>) -> Self {
        let store = Arc::clone(controller.store());
        Self { controller, store }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl IntoResponse for OperationResult {
    fn into_response(self) -> Response {
        (self.status().http_status(), Json(self)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(healthcheck))
        .route("/api/records/update", post(update_record))
        .route("/api/records/:id", get(get_record))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS]),
        )
        .with_state(state)
}

pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Runs the pipeline. A body that is not an `Input` is reported as `Invalid`.
pub async fn update_record(
    State(state): State<AppState>,
    payload: Result<Json<Input>, JsonRejection>,
) -> OperationResult {
    match payload {
        Ok(Json(input)) => state.controller.handle(&input).await,
        Err(rejection) => HTTP_RESULTS.invalid(rejection.body_text()),
    }
}

pub async fn get_record(State(state): State<AppState>, Path(id): Path<RecordId>) -> Response {
    match state.store.get(id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => HTTP_RESULTS
            .from_error(&EndpointError::NotFound(id))
            .into_response(),
        Err(err) => HTTP_RESULTS.from_error(&err.into()).into_response(),
    }
}
