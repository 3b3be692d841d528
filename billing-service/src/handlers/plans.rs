//! Plan catalog. Public, no caller identity required.

use axum::extract::{Path, State};
use service_core::error::AppError;
use service_core::response::{ApiListResponse, ApiResponse};
use uuid::Uuid;

use crate::models::Plan;
use crate::startup::AppState;

pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<ApiListResponse<Plan>, AppError> {
    Ok(ApiListResponse::unpaged(state.plans.list_active().await?))
}

pub async fn compare_plans(
    State(state): State<AppState>,
) -> Result<ApiListResponse<Plan>, AppError> {
    Ok(ApiListResponse::unpaged(state.plans.compare().await?))
}

pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<ApiResponse<Plan>, AppError> {
    Ok(ApiResponse::success(state.plans.get_by_id(plan_id).await?))
}

pub async fn get_plan_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<ApiResponse<Plan>, AppError> {
    Ok(ApiResponse::success(state.plans.get_by_slug(&slug).await?))
}
