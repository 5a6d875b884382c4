use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    recipes::{
        dto::{
            CreateRecipeRequest, RecipeDetailResponse, RecipeImageResponse, RecipeQuery,
            RecipeResponse, UpdateRecipeRequest,
        },
        repo_types::RecipeAggregate,
        services::{self, RecipeError},
    },
    state::AppState,
};

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/:id",
            get(get_recipe)
                .put(replace_recipe)
                .patch(patch_recipe)
                .delete(delete_recipe),
        )
        .route(
            "/recipes/:id/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<RecipeQuery>,
) -> Result<Json<Vec<RecipeResponse>>, (StatusCode, String)> {
    let filter = query
        .into_filter()
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;
    let recipes = services::list_recipes(state.recipes.as_ref(), user_id, &filter)
        .await
        .map_err(recipe_error)?;
    Ok(Json(recipes.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<RecipeDetailResponse>, (StatusCode, String)> {
    let recipe = services::get_recipe(state.recipes.as_ref(), user_id, id)
        .await
        .map_err(recipe_error)?;
    Ok(Json(detail(&state, recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateRecipeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(msg) = payload.validate() {
        warn!(%msg, "invalid recipe payload");
        return Err((StatusCode::BAD_REQUEST, msg));
    }

    let recipe = services::create_recipe(state.recipes.as_ref(), user_id, payload.into_new_recipe())
        .await
        .map_err(recipe_error)?;
    let location = format!("/api/v1/recipes/{}", recipe.recipe.id);

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(detail(&state, recipe).await?),
    ))
}

#[instrument(skip(state, payload))]
pub async fn replace_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecipeRequest>,
) -> Result<Json<RecipeDetailResponse>, (StatusCode, String)> {
    update(state, user_id, id, payload, true).await
}

#[instrument(skip(state, payload))]
pub async fn patch_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecipeRequest>,
) -> Result<Json<RecipeDetailResponse>, (StatusCode, String)> {
    update(state, user_id, id, payload, false).await
}

async fn update(
    state: AppState,
    user_id: Uuid,
    id: Uuid,
    payload: UpdateRecipeRequest,
    full: bool,
) -> Result<Json<RecipeDetailResponse>, (StatusCode, String)> {
    if let Err(msg) = payload.validate(full) {
        warn!(%msg, "invalid recipe update");
        return Err((StatusCode::BAD_REQUEST, msg));
    }

    let recipe = services::update_recipe(state.recipes.as_ref(), user_id, id, payload.into_changes())
        .await
        .map_err(recipe_error)?;
    Ok(Json(detail(&state, recipe).await?))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    services::delete_recipe(state.recipes.as_ref(), state.storage.as_ref(), user_id, id)
        .await
        .map_err(recipe_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /recipes/:id/upload-image (multipart, field `image`)
#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<Json<RecipeImageResponse>, (StatusCode, String)> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        if body.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "image is empty".into()));
        }

        let (recipe, url) = services::upload_image(
            state.recipes.as_ref(),
            state.storage.as_ref(),
            user_id,
            id,
            &filename,
            content_type.as_deref(),
            body,
        )
        .await
        .map_err(recipe_error)?;
        return Ok(Json(RecipeImageResponse {
            id: recipe.id,
            image: url,
        }));
    }
    Err((StatusCode::BAD_REQUEST, "image is required".into()))
}

async fn detail(
    state: &AppState,
    recipe: RecipeAggregate,
) -> Result<RecipeDetailResponse, (StatusCode, String)> {
    let image_url = match recipe.recipe.image.as_deref() {
        Some(key) => Some(
            services::image_url(state.storage.as_ref(), key)
                .await
                .map_err(|e| {
                    error!(error = %e, %key, "presign failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "presign failed".to_string())
                })?,
        ),
        None => None,
    };
    Ok(RecipeDetailResponse::new(recipe, image_url))
}

pub(crate) fn recipe_error(e: RecipeError) -> (StatusCode, String) {
    let status = match &e {
        RecipeError::NotFound | RecipeError::LabelNotFound(_) => StatusCode::NOT_FOUND,
        RecipeError::DuplicateLabel(_) => StatusCode::CONFLICT,
        RecipeError::Internal(err) => {
            error!(error = %err, "recipe operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}
