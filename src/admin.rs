//! Administrator commands. Every handler checks the admin token before
//! touching the coordinator.

use crate::auth::require_admin;
use crate::db::models::SubjectKind;
use crate::error::VotingError;
use crate::proxy::ProxyOverlay;
use crate::startup::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::HeaderMap,
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn activate_resolution(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    let snapshot = app_state
        .coordinator
        .activate_subject(id, SubjectKind::Resolution)
        .await?;
    Ok(Json(snapshot))
}

pub async fn activate_candidate(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    let snapshot = app_state
        .coordinator
        .activate_subject(id, SubjectKind::Candidate)
        .await?;
    Ok(Json(snapshot))
}

pub async fn open_voting(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    Ok(Json(app_state.coordinator.open_window().await?))
}

pub async fn close_voting(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    Ok(Json(app_state.coordinator.close_window().await?))
}

pub async fn toggle_voting(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    Ok(Json(app_state.coordinator.toggle_window().await?))
}

pub async fn close_current(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    Ok(Json(app_state.coordinator.close_current().await?))
}

pub async fn end_agm(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    Ok(Json(app_state.coordinator.end_event().await?))
}

pub async fn set_proxy_settings(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProxyOverlay>,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    Ok(Json(app_state.coordinator.set_proxy_overlay(payload).await?))
}

/// Restores the default proxy figures.
pub async fn enable_proxy(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    let overlay = app_state
        .coordinator
        .set_proxy_overlay(ProxyOverlay::default())
        .await?;
    Ok(Json(overlay))
}

pub async fn disable_proxy(
    Extension(app_state): Extension<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, VotingError> {
    require_admin(&headers, &app_state.config)?;
    let overlay = app_state
        .coordinator
        .set_proxy_overlay(ProxyOverlay::disabled())
        .await?;
    Ok(Json(overlay))
}
