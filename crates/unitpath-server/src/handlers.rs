//! Route handlers. Each one is a thin adapter from HTTP to a
//! [`LearningEngine`] operation.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use unitpath_core::engine::{
    BatchUnlock, LearningEngine, PlacementAnswer, PlacementResult, PlacementView, SkipRequest,
    StartPlacement, SubmitOutcome, SubmitRequest, TrackAccess,
};
use unitpath_core::model::UnitProgress;

use crate::context::Caller;
use crate::envelope::{ApiError, ApiResponse, ApiResult};

pub type AppState = Arc<LearningEngine>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::Rejected(e.body_text()))
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub store: String,
    pub content: String,
}

pub async fn health(State(engine): State<AppState>) -> ApiResponse<Health> {
    ApiResponse::ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: engine.store_name().to_string(),
        content: engine.content_name().to_string(),
    })
}

pub async fn submit_answer(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<SubmitOutcome> {
    let request = body(payload)?;
    Ok(ApiResponse::ok(engine.submit_answer(&ctx, &request).await?))
}

pub async fn skip(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    payload: Result<Json<SkipRequest>, JsonRejection>,
) -> ApiResult<SubmitOutcome> {
    let request = body(payload)?;
    Ok(ApiResponse::ok(engine.skip(&ctx, &request).await?))
}

pub async fn unit_progress(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    Path(unit_id): Path<String>,
) -> ApiResult<UnitProgress> {
    Ok(ApiResponse::ok(
        engine.get_unit_progress(&ctx.student_id, &unit_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub grade: Option<u8>,
}

pub async fn track_access(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    Path(subject_code): Path<String>,
    query: Result<Query<AccessQuery>, QueryRejection>,
) -> ApiResult<TrackAccess> {
    let Query(query) = query.map_err(|e| ApiError::Rejected(e.body_text()))?;
    Ok(ApiResponse::ok(
        engine
            .track_access(&ctx.student_id, &subject_code, query.grade)
            .await?,
    ))
}

pub async fn start_placement(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    payload: Result<Json<StartPlacement>, JsonRejection>,
) -> ApiResult<PlacementView> {
    let request = body(payload)?;
    Ok(ApiResponse::ok(engine.start_placement(&ctx, &request).await?))
}

pub async fn answer_placement(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    Path(plan_id): Path<String>,
    payload: Result<Json<PlacementAnswer>, JsonRejection>,
) -> ApiResult<PlacementView> {
    let request = body(payload)?;
    Ok(ApiResponse::ok(
        engine.answer_placement(&ctx, &plan_id, &request).await?,
    ))
}

pub async fn finish_placement(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    Path(plan_id): Path<String>,
) -> ApiResult<PlacementResult> {
    Ok(ApiResponse::ok(engine.finish_placement(&ctx, &plan_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUnlockRequest {
    pub unit_ids: Vec<String>,
}

pub async fn batch_unlock(
    State(engine): State<AppState>,
    Caller(ctx): Caller,
    payload: Result<Json<BatchUnlockRequest>, JsonRejection>,
) -> ApiResult<BatchUnlock> {
    let request = body(payload)?;
    Ok(ApiResponse::ok(
        engine.batch_unlock(&ctx, &request.unit_ids).await?,
    ))
}
