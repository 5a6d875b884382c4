use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::TokenKind,
        dto::{LoginRequest, PublicUser, RefreshRequest, RegisterRequest, TokenResponse, UpdateMeRequest},
        jwt::{AuthUser, JwtKeys},
        repo_types::User,
        services::{self, AccountError, ProfileUpdate},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/token", post(login))
        .route("/users/token/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me).patch(update_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    if let Err(msg) = payload.validate() {
        warn!(%msg, "invalid registration payload");
        return Err((StatusCode::BAD_REQUEST, msg));
    }

    let user = services::create_user(
        state.users.as_ref(),
        &payload.email,
        &payload.password,
        &payload.name,
    )
    .await
    .map_err(account_error)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    let user = services::authenticate(state.users.as_ref(), &payload.email, &payload.password)
        .await
        .map_err(account_error)?;

    let keys = JwtKeys::from_ref(&state);
    let response = issue_tokens(&keys, user)?;
    info!(user_id = %response.user.id, "user logged in");
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = match state.users.find_by_id(claims.sub).await {
        Ok(Some(u)) if u.is_active => u,
        Ok(_) => return Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        Err(e) => {
            error!(error = %e, user_id = %claims.sub, "load user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) => Ok(Json(user.into())),
        Ok(None) => Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        Err(e) => {
            error!(error = %e, %user_id, "load user failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    payload
        .validate()
        .map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    let update = ProfileUpdate {
        email: payload.email,
        name: payload.name,
        password: payload.password,
    };
    let user = services::update_profile(state.users.as_ref(), user_id, update)
        .await
        .map_err(account_error)?;
    Ok(Json(user.into()))
}

fn issue_tokens(keys: &JwtKeys, user: User) -> Result<TokenResponse, (StatusCode, String)> {
    let sign = |token: anyhow::Result<String>| {
        token.map_err(|e| {
            error!(error = %e, "jwt sign failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
    };
    let access_token = sign(keys.sign_access(user.id))?;
    let refresh_token = sign(keys.sign_refresh(user.id))?;
    Ok(TokenResponse {
        access_token,
        refresh_token,
        user: user.into(),
    })
}

fn account_error(e: AccountError) -> (StatusCode, String) {
    let status = match &e {
        AccountError::EmptyEmail => StatusCode::BAD_REQUEST,
        AccountError::EmailTaken => StatusCode::CONFLICT,
        AccountError::InvalidCredentials | AccountError::NotFound => StatusCode::UNAUTHORIZED,
        AccountError::Internal(err) => {
            error!(error = %err, "account operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}
