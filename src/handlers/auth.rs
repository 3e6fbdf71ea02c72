use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::AppState;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::create_token;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl UserInfo {
    fn from_model(user: &user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

pub(crate) fn verify_password(password: &str, hash: &str) -> AppResult<()> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Failed to parse password hash: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))
}

fn auth_response(state: &AppState, user: &user::Model) -> AppResult<Json<JsonValue>> {
    let token = create_token(
        user.id,
        &user.email,
        user.role.clone(),
        &state.config.jwt_secret,
        state.config.jwt_expiration_hours,
    )?;

    Ok(Json(json!({
        "status": "success",
        "token": token,
        "data": { "user": UserInfo::from_model(user) },
    })))
}

/// Register a new customer account
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<Json<JsonValue>> {
    let mut errors = Vec::new();
    if payload.name.trim().is_empty() {
        errors.push("Please tell us your name".to_string());
    }
    if !payload.email.contains('@') {
        errors.push("Please provide a valid email".to_string());
    }
    if payload.password.chars().count() < 8 {
        errors.push("A password must have at least 8 characters".to_string());
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    // Check if email already exists
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&payload.email))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let new_user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.clone()),
        email: Set(payload.email.clone()),
        password_hash: Set(hash_password(&payload.password)?),
        role: Set(UserRole::User),
        ..Default::default()
    };

    let user = new_user.insert(&state.db).await?;
    auth_response(&state, &user)
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<JsonValue>> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(&payload.email))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !user.active {
        return Err(AppError::Unauthorized(
            "This account has been deactivated".to_string(),
        ));
    }

    verify_password(&payload.password, &user.password_hash)?;
    auth_response(&state, &user)
}

/// Rotate the signed-in user's password and issue a fresh token
pub async fn update_password(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> AppResult<Json<JsonValue>> {
    verify_password(&payload.current_password, &current_user.password_hash)
        .map_err(|_| AppError::Unauthorized("Your current password is wrong".to_string()))?;

    if payload.new_password.chars().count() < 8 {
        return Err(AppError::Validation(vec![
            "A password must have at least 8 characters".to_string(),
        ]));
    }

    let mut model = current_user.into_active_model();
    model.password_hash = Set(hash_password(&payload.new_password)?);
    // Stamped so tokens issued before this moment stop validating.
    model.password_changed_at = Set(Some(Utc::now().into()));
    let user = model.update(&state.db).await?;

    auth_response(&state, &user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct-horse-battery").unwrap();
        assert!(verify_password("correct-horse-battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong-password", &hash),
            Err(AppError::Unauthorized(_))
        ));
    }
}
