use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult, ModelTrait,
    QueryFilter, QuerySelect, Set,
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::AppState;
use crate::entities::tour::{self, DEFAULT_RATINGS_AVERAGE};
use crate::entities::user::{self, UserRole};
use crate::entities::review;
use crate::error::{AppError, AppResult};
use crate::handlers::factory::{self, CrudResource};

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub body: String,
    pub rating: f64,
    pub tour_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub body: Option<String>,
    pub rating: Option<f64>,
    // A review stays attached to its tour and author for life.
}

fn check_rating(value: f64, errors: &mut Vec<String>) {
    if !(1.0..=5.0).contains(&value) {
        errors.push("Rating must be between 1.0 and 5.0".to_string());
    }
}

pub struct ReviewResource;

impl CrudResource for ReviewResource {
    type Entity = review::Entity;
    type Model = review::Model;
    type ActiveModel = review::ActiveModel;
    type CreatePayload = CreateReviewRequest;
    type UpdatePayload = UpdateReviewRequest;

    const SINGULAR: &'static str = "review";
    const PLURAL: &'static str = "reviews";

    fn validate_create(payload: &CreateReviewRequest) -> AppResult<()> {
        let mut errors = Vec::new();

        if payload.body.trim().is_empty() {
            errors.push("Review can not be empty".to_string());
        }
        check_rating(payload.rating, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn validate_update(_existing: &review::Model, patch: &UpdateReviewRequest) -> AppResult<()> {
        let mut errors = Vec::new();

        if let Some(body) = &patch.body {
            if body.trim().is_empty() {
                errors.push("Review can not be empty".to_string());
            }
        }
        if let Some(rating) = patch.rating {
            check_rating(rating, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn create_model(payload: CreateReviewRequest) -> AppResult<review::ActiveModel> {
        Ok(review::ActiveModel {
            id: Set(Uuid::new_v4()),
            body: Set(payload.body),
            rating: Set(payload.rating),
            tour_id: Set(payload.tour_id),
            user_id: Set(payload.user_id),
            ..Default::default()
        })
    }

    fn apply_update(model: &mut review::ActiveModel, patch: UpdateReviewRequest) {
        if let Some(body) = patch.body {
            model.body = Set(body);
        }
        if let Some(rating) = patch.rating {
            model.rating = Set(rating);
        }
    }
}

/// Folds the aggregate over a tour's reviews into its denormalized rating
/// fields. An empty review set resets to the unreviewed defaults.
pub fn rating_fields(count: i64, mean: Option<f64>) -> (i32, f64) {
    match mean {
        Some(mean) if count > 0 => (count as i32, (mean * 10.0).round() / 10.0),
        _ => (0, DEFAULT_RATINGS_AVERAGE),
    }
}

#[derive(Debug, FromQueryResult)]
struct RatingStats {
    n_rating: i64,
    avg_rating: Option<f64>,
}

/// Recomputes a tour's `ratings_quantity` and `ratings_average` from the
/// current review set. Idempotent; safe to invoke redundantly.
///
/// The aggregate-then-write pair is not atomic: overlapping review writes to
/// the same tour race and the last recompute wins. Any later write converges
/// the fields again.
pub async fn recalc_tour_ratings(db: &DatabaseConnection, tour_id: Uuid) -> AppResult<()> {
    let stats = review::Entity::find()
        .select_only()
        .column_as(
            SimpleExpr::from(Func::count(Expr::col(review::Column::Rating))),
            "n_rating",
        )
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(review::Column::Rating))),
            "avg_rating",
        )
        .filter(review::Column::TourId.eq(tour_id))
        .into_model::<RatingStats>()
        .one(db)
        .await?
        .unwrap_or(RatingStats {
            n_rating: 0,
            avg_rating: None,
        });

    let (quantity, average) = rating_fields(stats.n_rating, stats.avg_rating);

    tour::Entity::update_many()
        .col_expr(tour::Column::RatingsQuantity, Expr::value(quantity))
        .col_expr(tour::Column::RatingsAverage, Expr::value(average))
        .filter(tour::Column::Id.eq(tour_id))
        .exec(db)
        .await?;

    Ok(())
}

/// The review write has already committed, so a failed recompute is logged
/// and left for the next write to reconcile instead of failing the request.
async fn recalc_after_write(db: &DatabaseConnection, tour_id: Uuid) {
    if let Err(err) = recalc_tour_ratings(db, tour_id).await {
        tracing::error!(%tour_id, error = %err, "failed to recompute tour ratings");
    }
}

/// Reviews of one tour (nested route)
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    Path(tour_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<JsonValue>> {
    let scope = Condition::all().add(review::Column::TourId.eq(tour_id));
    let documents = factory::find_all::<ReviewResource>(&state.db, params, Some(scope)).await?;
    Ok(Json(factory::success_many("reviews", documents)))
}

/// POST /reviews — the tour id comes from the body
pub async fn create_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
    Json(payload): Json<JsonValue>,
) -> AppResult<(StatusCode, Json<JsonValue>)> {
    create_for_tour(&state, current_user, None, payload).await
}

/// POST /tours/{tour_id}/reviews — the tour id comes from the path
pub async fn create_tour_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
    Path(tour_id): Path<Uuid>,
    Json(payload): Json<JsonValue>,
) -> AppResult<(StatusCode, Json<JsonValue>)> {
    create_for_tour(&state, current_user, Some(tour_id), payload).await
}

async fn create_for_tour(
    state: &AppState,
    current_user: user::Model,
    tour_id: Option<Uuid>,
    mut payload: JsonValue,
) -> AppResult<(StatusCode, Json<JsonValue>)> {
    let Some(map) = payload.as_object_mut() else {
        return Err(AppError::Validation(vec![
            "Request body must be a JSON object".to_string(),
        ]));
    };

    // The author is always the authenticated user; the tour reference from a
    // nested path wins over whatever the body claims.
    map.insert("user_id".to_string(), json!(current_user.id));
    if let Some(tour_id) = tour_id {
        map.insert("tour_id".to_string(), json!(tour_id));
    }

    let review = factory::create::<ReviewResource>(&state.db, payload).await?;
    recalc_after_write(&state.db, review.tour_id).await;

    Ok((
        StatusCode::CREATED,
        Json(factory::success_one("review", serde_json::to_value(&review)?)),
    ))
}

/// Review detail with the author's public fields populated
pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<JsonValue>> {
    let review = factory::fetch_one::<ReviewResource>(&state.db, id).await?;
    let author = review.find_related(user::Entity).one(&state.db).await?;

    let mut document = serde_json::to_value(&review)?;
    if let Some(author) = author {
        document["user"] = json!({
            "id": author.id,
            "name": author.name,
            "photo": author.photo,
        });
    }

    Ok(Json(factory::success_one("review", document)))
}

fn ensure_author_or_admin(review: &review::Model, user: &user::Model) -> AppResult<()> {
    if user.role != UserRole::Admin && review.user_id != user.id {
        return Err(AppError::Forbidden(
            "You can only modify your own reviews".to_string(),
        ));
    }
    Ok(())
}

pub async fn update_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
    Path(id): Path<Uuid>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Json<JsonValue>> {
    let existing = factory::fetch_one::<ReviewResource>(&state.db, id).await?;
    ensure_author_or_admin(&existing, &current_user)?;

    let review = factory::update::<ReviewResource>(&state.db, id, payload).await?;
    recalc_after_write(&state.db, review.tour_id).await;

    Ok(Json(factory::success_one("review", serde_json::to_value(&review)?)))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Extension(current_user): Extension<user::Model>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let existing = factory::fetch_one::<ReviewResource>(&state.db, id).await?;
    ensure_author_or_admin(&existing, &current_user)?;

    // The tour reference is taken from the pre-deletion document.
    let removed = factory::remove::<ReviewResource>(&state.db, id).await?;
    recalc_after_write(&state.db, removed.tour_id).await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_review(user_id: Uuid) -> review::Model {
        review::Model {
            id: Uuid::new_v4(),
            body: "Loved every minute of it".to_string(),
            rating: 4.0,
            tour_id: Uuid::new_v4(),
            user_id,
            created_at: "2025-06-10T12:00:00+00:00".parse().unwrap(),
        }
    }

    fn sample_user(role: UserRole) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            name: "Jonas".to_string(),
            email: "jonas@example.com".to_string(),
            photo: None,
            role,
            password_hash: "hash".to_string(),
            password_changed_at: None,
            active: true,
            created_at: "2025-01-01T00:00:00+00:00".parse().unwrap(),
        }
    }

    #[test]
    fn empty_review_set_resets_to_defaults() {
        assert_eq!(rating_fields(0, None), (0, DEFAULT_RATINGS_AVERAGE));
        // A zero count wins even if the store reported a stale mean.
        assert_eq!(rating_fields(0, Some(3.0)), (0, DEFAULT_RATINGS_AVERAGE));
    }

    #[test]
    fn mean_of_two_reviews() {
        // Ratings 3 and 5 aggregate to a mean of 4.0.
        assert_eq!(rating_fields(2, Some(4.0)), (2, 4.0));
    }

    #[test]
    fn mean_is_rounded_to_one_decimal() {
        assert_eq!(rating_fields(3, Some(11.0 / 3.0)), (3, 3.7));
        assert_eq!(rating_fields(7, Some(4.44)), (7, 4.4));
    }

    #[test]
    fn ratings_outside_range_are_rejected() {
        for rating in [0.0, 0.9, 5.1, -1.0] {
            let payload = CreateReviewRequest {
                body: "ok".to_string(),
                rating,
                tour_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
            };
            assert!(
                ReviewResource::validate_create(&payload).is_err(),
                "{rating}"
            );
        }
    }

    #[test]
    fn blank_body_is_rejected() {
        let payload = CreateReviewRequest {
            body: "   ".to_string(),
            rating: 4.0,
            tour_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        };
        assert!(ReviewResource::validate_create(&payload).is_err());
    }

    #[test]
    fn review_requires_a_tour_reference() {
        let result: Result<CreateReviewRequest, _> = serde_json::from_value(json!({
            "body": "great",
            "rating": 5.0,
            "user_id": Uuid::new_v4(),
        }));
        assert!(result.is_err());
    }

    #[test]
    fn only_the_author_or_an_admin_may_modify() {
        let author = sample_user(UserRole::User);
        let review = sample_review(author.id);

        assert!(ensure_author_or_admin(&review, &author).is_ok());
        assert!(ensure_author_or_admin(&review, &sample_user(UserRole::Admin)).is_ok());
        assert!(ensure_author_or_admin(&review, &sample_user(UserRole::User)).is_err());
        assert!(ensure_author_or_admin(&review, &sample_user(UserRole::Guide)).is_err());
    }
}
