use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::AppState;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::handlers::factory::{self, CrudResource};

/// Admin-side patch. Role and active flag are only reachable through here.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

/// Self-service patch: profile fields only.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}

fn check_email(email: &str, errors: &mut Vec<String>) {
    if email.trim().is_empty() || !email.contains('@') {
        errors.push("Please provide a valid email".to_string());
    }
}

pub struct UserResource;

impl CrudResource for UserResource {
    type Entity = user::Entity;
    type Model = user::Model;
    type ActiveModel = user::ActiveModel;
    type CreatePayload = JsonValue;
    type UpdatePayload = UpdateUserRequest;

    const SINGULAR: &'static str = "user";
    const PLURAL: &'static str = "users";
    const HIDDEN_FIELDS: &'static [&'static str] = &["password_hash"];

    /// Soft-deleted accounts stay invisible to default reads.
    fn default_scope() -> Condition {
        Condition::all().add(user::Column::Active.eq(true))
    }

    fn validate_update(_existing: &user::Model, patch: &UpdateUserRequest) -> AppResult<()> {
        let mut errors = Vec::new();

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                errors.push("Please tell us your name".to_string());
            }
        }
        if let Some(email) = &patch.email {
            check_email(email, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    /// Accounts are only created through /signup.
    fn create_model(_payload: JsonValue) -> AppResult<user::ActiveModel> {
        Err(AppError::BadRequest(
            "This route is not defined. Please use /signup instead".to_string(),
        ))
    }

    fn apply_update(model: &mut user::ActiveModel, patch: UpdateUserRequest) {
        if let Some(name) = patch.name {
            model.name = Set(name);
        }
        if let Some(email) = patch.email {
            model.email = Set(email);
        }
        if let Some(photo) = patch.photo {
            model.photo = Set(Some(photo));
        }
        if let Some(role) = patch.role {
            model.role = Set(role);
        }
        if let Some(active) = patch.active {
            model.active = Set(active);
        }
    }
}

/// The signed-in user's own profile
pub async fn get_me(
    Extension(current_user): Extension<user::Model>,
) -> AppResult<Json<JsonValue>> {
    Ok(Json(factory::success_one(
        "user",
        serde_json::to_value(&current_user)?,
    )))
}

/// Self-service profile update; password changes go through their own route
pub async fn update_me(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Json<JsonValue>> {
    if payload.get("password").is_some() || payload.get("password_confirm").is_some() {
        return Err(AppError::BadRequest(
            "This route is not for password updates. Please use /update-my-password".to_string(),
        ));
    }

    let patch: UpdateMeRequest = serde_json::from_value(payload)
        .map_err(|e| AppError::Validation(vec![e.to_string()]))?;

    // Re-serializing the typed patch drops every field a user may not touch.
    let filtered = serde_json::to_value(&patch)?;
    let updated = factory::update::<UserResource>(&state.db, current_user.id, filtered).await?;

    Ok(Json(factory::success_one(
        "user",
        serde_json::to_value(&updated)?,
    )))
}

/// Soft delete of the signed-in account
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
) -> AppResult<StatusCode> {
    let mut model = current_user.into_active_model();
    model.active = Set(false);
    model.update(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, EntityTrait, QueryFilter, QueryTrait};
    use serde_json::json;

    use super::*;

    #[test]
    fn default_scope_hides_deactivated_accounts() {
        let sql = user::Entity::find()
            .filter(UserResource::default_scope())
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#""user"."active" = TRUE"#), "{sql}");
    }

    #[test]
    fn create_is_redirected_to_signup() {
        let result = UserResource::create_model(json!({ "name": "Eve" }));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn self_service_patch_cannot_smuggle_a_role() {
        let patch: UpdateMeRequest = serde_json::from_value(json!({
            "name": "New Name",
            "role": "admin",
            "active": false,
        }))
        .unwrap();

        let filtered = serde_json::to_value(&patch).unwrap();
        assert!(filtered.get("role").is_none());
        assert!(filtered.get("active").is_none());
        assert_eq!(filtered["name"], "New Name");
    }

    #[test]
    fn invalid_email_patch_is_rejected() {
        let existing = user::Model {
            id: uuid::Uuid::new_v4(),
            name: "Jonas".to_string(),
            email: "jonas@example.com".to_string(),
            photo: None,
            role: UserRole::User,
            password_hash: "hash".to_string(),
            password_changed_at: None,
            active: true,
            created_at: "2025-01-01T00:00:00+00:00".parse().unwrap(),
        };

        let patch: UpdateUserRequest =
            serde_json::from_value(json!({ "email": "not-an-email" })).unwrap();
        assert!(UserResource::validate_update(&existing, &patch).is_err());
    }
}
