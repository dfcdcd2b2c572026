// handlers.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::error::AppError;
use crate::extract::{FormBody, JsonBody, PathParam};
use crate::identity::Requester;
use crate::models::{CreatePollRequest, QuickPollRequest, UpdatePollRequest, VoteForm, VoteRequest};
use crate::services;
use crate::AppState;

/// Liveness plus a round trip to the store.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "store": state.store.backend_tag() })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "store": state.store.backend_tag() })),
            )
        }
    }
}

pub async fn me(State(state): State<AppState>, requester: Requester) -> Result<impl IntoResponse, AppError> {
    let summary = services::account(state.store.as_ref(), &requester, Utc::now()).await?;
    Ok(Json(summary))
}

pub async fn list_polls(
    State(state): State<AppState>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    let polls = services::list_my_polls(state.store.as_ref(), &requester).await?;
    Ok(Json(polls))
}

pub async fn create_poll(
    State(state): State<AppState>,
    requester: Requester,
    JsonBody(req): JsonBody<CreatePollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = services::create_poll(state.store.as_ref(), req, &requester, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn create_quick_poll(
    State(state): State<AppState>,
    requester: Requester,
    JsonBody(req): JsonBody<QuickPollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = services::create_quick_poll(state.store.as_ref(), req, &requester, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_poll(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let detail = services::get_poll(state.store.as_ref(), &slug, Utc::now()).await?;
    Ok(Json(detail))
}

pub async fn update_poll(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
    JsonBody(edit): JsonBody<UpdatePollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let poll = services::update_poll(state.store.as_ref(), &slug, edit, &requester, Utc::now()).await?;
    Ok(Json(poll))
}

pub async fn delete_poll(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    services::delete_poll(state.store.as_ref(), &slug, &requester).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_poll(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    let poll = services::publish_poll(state.store.as_ref(), &slug, &requester, Utc::now()).await?;
    Ok(Json(poll))
}

pub async fn toggle_poll(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    let poll = services::toggle_poll(state.store.as_ref(), &slug, &requester, Utc::now()).await?;
    Ok(Json(poll))
}

pub async fn close_poll(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    let poll = services::close_poll(state.store.as_ref(), &slug, &requester).await?;
    Ok(Json(poll))
}

/// Vote for one or more choices
pub async fn vote(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
    JsonBody(vote_data): JsonBody<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let receipt =
        services::cast_vote(state.store.as_ref(), &slug, &vote_data.choices, &requester, Utc::now())
            .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Vote from a plain form post, then send the browser on to the results.
pub async fn vote_form(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
    FormBody(form): FormBody<VoteForm>,
) -> Result<impl IntoResponse, AppError> {
    services::cast_vote(state.store.as_ref(), &slug, &[form.choice], &requester, Utc::now()).await?;
    Ok(Redirect::to(&format!("/api/polls/{slug}/results")))
}

pub async fn results(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    let results = services::results(state.store.as_ref(), &slug, &requester).await?;
    Ok(Json(results))
}

pub async fn stats(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = services::stats(state.store.as_ref(), &slug, Utc::now()).await?;
    Ok(Json(stats))
}

pub async fn share(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
) -> Result<impl IntoResponse, AppError> {
    let links = services::share(state.store.as_ref(), &slug, &state.config.public_base_url).await?;
    Ok(Json(links))
}

pub async fn vote_log(
    State(state): State<AppState>,
    PathParam(slug): PathParam<String>,
    requester: Requester,
) -> Result<impl IntoResponse, AppError> {
    let votes = services::vote_log(state.store.as_ref(), &slug, &requester).await?;
    Ok(Json(votes))
}
