use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use sea_orm::EntityTrait;

use crate::AppState;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::verify_token;

/// Validates the bearer token, loads the account behind it, and rejects
/// tokens issued before the last password change.
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;

    let current_user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized("The user belonging to this token no longer exists".to_string())
        })?;

    if !current_user.active {
        return Err(AppError::Unauthorized(
            "This account has been deactivated".to_string(),
        ));
    }

    if let Some(changed_at) = current_user.password_changed_at {
        if changed_at.timestamp() > claims.iat {
            return Err(AppError::Unauthorized(
                "Password was changed recently. Please log in again".to_string(),
            ));
        }
    }

    request.extensions_mut().insert(current_user);
    Ok(next.run(request).await)
}

fn current_role(request: &Request) -> AppResult<UserRole> {
    request
        .extensions()
        .get::<user::Model>()
        .map(|user| user.role.clone())
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))
}

/// Require admin role
pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    if current_role(&request)? != UserRole::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Require admin or lead-guide role
pub async fn require_tour_manager(request: Request, next: Next) -> AppResult<Response> {
    if !matches!(
        current_role(&request)?,
        UserRole::Admin | UserRole::LeadGuide
    ) {
        return Err(AppError::Forbidden(
            "Admin or lead-guide access required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

/// Require any staff role
pub async fn require_guide_staff(request: Request, next: Next) -> AppResult<Response> {
    if !matches!(
        current_role(&request)?,
        UserRole::Admin | UserRole::LeadGuide | UserRole::Guide
    ) {
        return Err(AppError::Forbidden("Staff access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Require the plain customer role
pub async fn require_user_role(request: Request, next: Next) -> AppResult<Response> {
    if current_role(&request)? != UserRole::User {
        return Err(AppError::Forbidden("Customer access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Require a customer or an admin
pub async fn require_reviewer(request: Request, next: Next) -> AppResult<Response> {
    if !matches!(current_role(&request)?, UserRole::User | UserRole::Admin) {
        return Err(AppError::Forbidden(
            "Customer or admin access required".to_string(),
        ));
    }

    Ok(next.run(request).await)
}
