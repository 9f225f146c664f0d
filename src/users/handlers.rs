use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    error::ApiError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser},
        password::hash_password,
        repo_types::{NewUser, User},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).delete(delete_user))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::Validation(format!("{field} is required"))),
    }
}

/// List every user, soft-deleted ones included.
#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = state.users.get_all().await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let username = required(payload.username, "username")?.trim().to_string();
    let email = required(payload.email, "email")?.trim().to_lowercase();
    let password = required(payload.password, "password")?;

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }

    if state.users.find_by_username(&username).await?.is_some() {
        warn!(%username, "username already taken");
        return Err(ApiError::Conflict("username already taken".into()));
    }
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(ApiError::Conflict("email already registered".into()));
    }

    let password_hash =
        hash_password(&state.config.security, &password).map_err(ApiError::internal)?;
    let user = state
        .users
        .save(NewUser {
            username,
            email,
            password_hash,
        })
        .await?;

    info!(user_id = user.audit.id, username = %user.username, "user created");
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

/// Fetch one user; soft-deleted ids read as absent.
#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = active_user(&state, id).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let user = active_user(&state, id).await?;
    state.users.soft_delete(&user).await?;
    info!(user_id = id, "user soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn active_user(state: &AppState, id: i64) -> Result<User, ApiError> {
    state
        .users
        .get_by_id(id)
        .await?
        .filter(|user| !user.audit.is_deleted())
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))
}
