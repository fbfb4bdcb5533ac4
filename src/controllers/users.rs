use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::models::NewUser;
use crate::services::auth::AuthError;
use crate::store::UserStore;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
}

#[derive(Debug, Deserialize, Validate)]
struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 6, max = 72))]
    password: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    id: i64,
    name: String,
    email: String,
}

// POST /api/users/register
async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let password_hash = state.auth.hash_password(req.password).await?;
    let user = state
        .store
        .create_user(NewUser {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            password_hash,
        })
        .await?;

    tracing::info!("Registered user {}", user.id);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            name: user.name,
            email: user.email,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
}

// POST /api/users/login
async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .store
        .find_user_by_email(&req.email.trim().to_lowercase())
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    state
        .auth
        .verify_password(req.password, user.password_hash.clone())
        .await?;

    let token = state.auth.issue_token(&user)?;
    Ok(Json(LoginResponse { token }))
}
