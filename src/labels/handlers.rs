//! Tag and ingredient endpoints. Both kinds share one implementation and differ
//! only in the [`LabelKind`] they pass down.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    labels::dto::{LabelQuery, RenameLabelRequest},
    recipes::{
        dto::LabelResponse,
        handlers::recipe_error,
        labels::LabelKind,
        services,
    },
    state::AppState,
};

type ApiResult<T> = Result<T, (StatusCode, String)>;

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags))
        .route("/tags/:id", axum::routing::patch(rename_tag).delete(delete_tag))
}

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients", get(list_ingredients))
        .route(
            "/ingredients/:id",
            axum::routing::patch(rename_ingredient).delete(delete_ingredient),
        )
}

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<LabelQuery>,
) -> ApiResult<Json<Vec<LabelResponse>>> {
    list(&state, user_id, LabelKind::Tag, query).await
}

#[instrument(skip(state, payload))]
pub async fn rename_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameLabelRequest>,
) -> ApiResult<Json<LabelResponse>> {
    rename(&state, user_id, LabelKind::Tag, id, payload).await
}

#[instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    delete(&state, user_id, LabelKind::Tag, id).await
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<LabelQuery>,
) -> ApiResult<Json<Vec<LabelResponse>>> {
    list(&state, user_id, LabelKind::Ingredient, query).await
}

#[instrument(skip(state, payload))]
pub async fn rename_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameLabelRequest>,
) -> ApiResult<Json<LabelResponse>> {
    rename(&state, user_id, LabelKind::Ingredient, id, payload).await
}

#[instrument(skip(state))]
pub async fn delete_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    delete(&state, user_id, LabelKind::Ingredient, id).await
}

async fn list(
    state: &AppState,
    user_id: Uuid,
    kind: LabelKind,
    query: LabelQuery,
) -> ApiResult<Json<Vec<LabelResponse>>> {
    let labels = services::list_labels(
        state.recipes.as_ref(),
        user_id,
        kind,
        query.assigned_only != 0,
    )
    .await
    .map_err(recipe_error)?;
    Ok(Json(labels.into_iter().map(Into::into).collect()))
}

async fn rename(
    state: &AppState,
    user_id: Uuid,
    kind: LabelKind,
    id: Uuid,
    payload: RenameLabelRequest,
) -> ApiResult<Json<LabelResponse>> {
    payload
        .validate()
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
    let label = services::rename_label(state.recipes.as_ref(), user_id, kind, id, &payload.name)
        .await
        .map_err(recipe_error)?;
    Ok(Json(label.into()))
}

async fn delete(state: &AppState, user_id: Uuid, kind: LabelKind, id: Uuid) -> ApiResult<StatusCode> {
    services::delete_label(state.recipes.as_ref(), user_id, kind, id)
        .await
        .map_err(recipe_error)?;
    Ok(StatusCode::NO_CONTENT)
}
