use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult,
    ModelTrait, Order, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use crate::AppState;
use crate::entities::tour::{self, Difficulty, GeoPoint, Waypoint, Waypoints};
use crate::entities::user::UserRole;
use crate::entities::{review, tour_guide, user};
use crate::error::{AppError, AppResult};
use crate::handlers::factory::{self, CrudResource};
use crate::utils::geo::is_within_radius;
use crate::utils::slug::slugify;

const MILES_TO_KM: f64 = 1.609344;

#[derive(Debug, Deserialize)]
pub struct CreateTourRequest {
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: Option<f64>,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<Waypoint>>,
    #[serde(default)]
    pub guides: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTourRequest {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub ratings_average: Option<f64>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTime<Utc>>>,
    pub secret_tour: Option<bool>,
    pub start_location: Option<GeoPoint>,
    pub locations: Option<Vec<Waypoint>>,
    // Consumed by the route handler, not by the generic update.
    pub guides: Option<Vec<Uuid>>,
}

fn check_name(name: &str, errors: &mut Vec<String>) {
    let len = name.trim().chars().count();
    if len < 10 {
        errors.push("A tour name must have at least 10 characters".to_string());
    }
    if len > 40 {
        errors.push("A tour name must have at most 40 characters".to_string());
    }
}

fn check_rating(value: f64, errors: &mut Vec<String>) {
    if !(1.0..=5.0).contains(&value) {
        errors.push("Rating must be between 1.0 and 5.0".to_string());
    }
}

fn check_discount(price: f64, discount: Option<f64>, errors: &mut Vec<String>) {
    if let Some(discount) = discount {
        if discount >= price {
            errors.push(format!(
                "Discount price ({discount}) should be below the regular price"
            ));
        }
    }
}

pub struct TourResource;

impl CrudResource for TourResource {
    type Entity = tour::Entity;
    type Model = tour::Model;
    type ActiveModel = tour::ActiveModel;
    type CreatePayload = CreateTourRequest;
    type UpdatePayload = UpdateTourRequest;

    const SINGULAR: &'static str = "tour";
    const PLURAL: &'static str = "tours";

    /// Secret tours never leave the building through a default read.
    fn default_scope() -> Condition {
        Condition::all().add(tour::Column::SecretTour.eq(false))
    }

    fn validate_create(payload: &CreateTourRequest) -> AppResult<()> {
        let mut errors = Vec::new();

        check_name(&payload.name, &mut errors);
        if payload.duration < 1 {
            errors.push("A tour must have a positive duration".to_string());
        }
        if payload.max_group_size < 1 {
            errors.push("A tour must have a positive group size".to_string());
        }
        if payload.price <= 0.0 {
            errors.push("A tour must have a positive price".to_string());
        }
        if payload.summary.trim().is_empty() {
            errors.push("A tour must have a summary".to_string());
        }
        if payload.image_cover.trim().is_empty() {
            errors.push("A tour must have a cover image".to_string());
        }
        if let Some(average) = payload.ratings_average {
            check_rating(average, &mut errors);
        }
        check_discount(payload.price, payload.price_discount, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn validate_update(existing: &tour::Model, patch: &UpdateTourRequest) -> AppResult<()> {
        let mut errors = Vec::new();

        if let Some(name) = &patch.name {
            check_name(name, &mut errors);
        }
        if let Some(duration) = patch.duration {
            if duration < 1 {
                errors.push("A tour must have a positive duration".to_string());
            }
        }
        if let Some(size) = patch.max_group_size {
            if size < 1 {
                errors.push("A tour must have a positive group size".to_string());
            }
        }
        if let Some(average) = patch.ratings_average {
            check_rating(average, &mut errors);
        }

        // Cross-field rule runs against the merged document.
        let price = patch.price.unwrap_or(existing.price);
        if price <= 0.0 {
            errors.push("A tour must have a positive price".to_string());
        }
        check_discount(
            price,
            patch.price_discount.or(existing.price_discount),
            &mut errors,
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }

    fn create_model(payload: CreateTourRequest) -> AppResult<tour::ActiveModel> {
        let mut model = tour::ActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(slugify(&payload.name)),
            name: Set(payload.name),
            duration: Set(payload.duration),
            max_group_size: Set(payload.max_group_size),
            difficulty: Set(payload.difficulty),
            price: Set(payload.price),
            price_discount: Set(payload.price_discount),
            summary: Set(payload.summary),
            description: Set(payload.description),
            image_cover: Set(payload.image_cover),
            images: Set(payload.images),
            start_dates: Set(payload
                .start_dates
                .map(|dates| dates.into_iter().map(Into::into).collect())),
            start_location: Set(payload.start_location),
            locations: Set(payload.locations.map(Waypoints)),
            ..Default::default()
        };

        if let Some(average) = payload.ratings_average {
            model.ratings_average = Set(average);
        }
        if let Some(secret) = payload.secret_tour {
            model.secret_tour = Set(secret);
        }

        Ok(model)
    }

    fn apply_update(model: &mut tour::ActiveModel, patch: UpdateTourRequest) {
        if let Some(name) = patch.name {
            model.name = Set(name);
        }
        if let Some(duration) = patch.duration {
            model.duration = Set(duration);
        }
        if let Some(size) = patch.max_group_size {
            model.max_group_size = Set(size);
        }
        if let Some(difficulty) = patch.difficulty {
            model.difficulty = Set(difficulty);
        }
        if let Some(average) = patch.ratings_average {
            model.ratings_average = Set(average);
        }
        if let Some(price) = patch.price {
            model.price = Set(price);
        }
        if let Some(discount) = patch.price_discount {
            model.price_discount = Set(Some(discount));
        }
        if let Some(summary) = patch.summary {
            model.summary = Set(summary);
        }
        if let Some(description) = patch.description {
            model.description = Set(Some(description));
        }
        if let Some(cover) = patch.image_cover {
            model.image_cover = Set(cover);
        }
        if let Some(images) = patch.images {
            model.images = Set(Some(images));
        }
        if let Some(dates) = patch.start_dates {
            model.start_dates = Set(Some(dates.into_iter().map(Into::into).collect()));
        }
        if let Some(secret) = patch.secret_tour {
            model.secret_tour = Set(secret);
        }
        if let Some(location) = patch.start_location {
            model.start_location = Set(Some(location));
        }
        if let Some(locations) = patch.locations {
            model.locations = Set(Some(Waypoints(locations)));
        }
    }
}

fn parse_guides(payload: &JsonValue) -> AppResult<Vec<Uuid>> {
    match payload.get("guides") {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
            AppError::Validation(vec!["Guides must be a list of user ids".to_string()])
        }),
    }
}

async fn verify_guides(db: &DatabaseConnection, guides: &[Uuid]) -> AppResult<()> {
    for guide_id in guides {
        let guide = user::Entity::find_by_id(*guide_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::BadRequest(format!("Guide {guide_id} does not exist")))?;

        if !matches!(guide.role, UserRole::Guide | UserRole::LeadGuide) {
            return Err(AppError::BadRequest(format!(
                "User {guide_id} is not a guide"
            )));
        }
    }
    Ok(())
}

/// Replaces the guide links of a tour wholesale.
async fn link_guides(db: &DatabaseConnection, tour_id: Uuid, guides: &[Uuid]) -> AppResult<()> {
    tour_guide::Entity::delete_many()
        .filter(tour_guide::Column::TourId.eq(tour_id))
        .exec(db)
        .await?;

    if guides.is_empty() {
        return Ok(());
    }

    let links: Vec<tour_guide::ActiveModel> = guides
        .iter()
        .map(|user_id| tour_guide::ActiveModel {
            tour_id: Set(tour_id),
            user_id: Set(*user_id),
        })
        .collect();

    tour_guide::Entity::insert_many(links).exec(db).await?;
    Ok(())
}

/// Create a tour and link its guides
pub async fn create_tour(
    State(state): State<AppState>,
    Json(payload): Json<JsonValue>,
) -> AppResult<(StatusCode, Json<JsonValue>)> {
    let guides = parse_guides(&payload)?;
    verify_guides(&state.db, &guides).await?;

    let tour = factory::create::<TourResource>(&state.db, payload).await?;
    link_guides(&state.db, tour.id, &guides).await?;

    Ok((
        StatusCode::CREATED,
        Json(factory::success_one("tour", serde_json::to_value(&tour)?)),
    ))
}

/// Partial update; a `guides` list replaces the existing links
pub async fn update_tour(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Json<JsonValue>> {
    let guides = if payload.get("guides").is_some() {
        Some(parse_guides(&payload)?)
    } else {
        None
    };
    if let Some(guides) = &guides {
        verify_guides(&state.db, guides).await?;
    }

    let tour = factory::update::<TourResource>(&state.db, id, payload).await?;

    if let Some(guides) = guides {
        link_guides(&state.db, tour.id, &guides).await?;
    }

    Ok(Json(factory::success_one("tour", serde_json::to_value(&tour)?)))
}

/// Tour detail with populated reviews and guides
pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<JsonValue>> {
    let tour = factory::fetch_one::<TourResource>(&state.db, id).await?;
    let reviews = tour.find_related(review::Entity).all(&state.db).await?;
    let guides = tour.find_related(user::Entity).all(&state.db).await?;

    let mut document = serde_json::to_value(&tour)?;
    document["duration_weeks"] = json!(tour.duration_weeks());
    document["reviews"] = serde_json::to_value(&reviews)?;
    document["guides"] = serde_json::to_value(&guides)?;

    Ok(Json(factory::success_one("tour", document)))
}

/// `/top-5-cheap`: the five best-rated tours, cheapest first on ties
pub async fn top_tours(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<JsonValue>> {
    let documents =
        factory::find_all::<TourResource>(&state.db, top_tours_params(params), None).await?;
    Ok(Json(factory::success_many("tours", documents)))
}

fn top_tours_params(mut params: HashMap<String, String>) -> HashMap<String, String> {
    params.insert("limit".to_string(), "5".to_string());
    params.insert("sort".to_string(), "-ratings_average,price".to_string());
    params.insert(
        "fields".to_string(),
        "name,price,ratings_average,summary,difficulty".to_string(),
    );
    params
}

#[derive(Debug, FromQueryResult, Serialize)]
pub struct TourStats {
    pub difficulty: Difficulty,
    pub num_tours: i64,
    pub num_ratings: i64,
    pub avg_rating: Option<f64>,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Aggregate rating and price statistics per difficulty, over well-rated
/// non-secret tours
pub async fn tour_stats(State(state): State<AppState>) -> AppResult<Json<JsonValue>> {
    let stats = tour::Entity::find()
        .select_only()
        .column(tour::Column::Difficulty)
        .column_as(
            SimpleExpr::from(Func::count(Expr::col(tour::Column::Id))),
            "num_tours",
        )
        .column_as(
            SimpleExpr::from(Func::sum(Expr::col(tour::Column::RatingsQuantity))),
            "num_ratings",
        )
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(tour::Column::RatingsAverage))),
            "avg_rating",
        )
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(tour::Column::Price))),
            "avg_price",
        )
        .column_as(
            SimpleExpr::from(Func::min(Expr::col(tour::Column::Price))),
            "min_price",
        )
        .column_as(
            SimpleExpr::from(Func::max(Expr::col(tour::Column::Price))),
            "max_price",
        )
        .filter(tour::Column::SecretTour.eq(false))
        .filter(tour::Column::RatingsAverage.gte(4.5))
        .group_by(tour::Column::Difficulty)
        .order_by(
            SimpleExpr::from(Func::avg(Expr::col(tour::Column::Price))),
            Order::Asc,
        )
        .into_model::<TourStats>()
        .all(&state.db)
        .await?;

    Ok(Json(json!({ "status": "success", "data": { "stats": stats } })))
}

#[derive(Debug, FromQueryResult, Serialize)]
pub struct MonthlyPlanRow {
    pub month: i32,
    pub num_tour_starts: i64,
    pub tours: Vec<String>,
}

/// Busiest months of a year, bucketed by tour start dates
pub async fn monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> AppResult<Json<JsonValue>> {
    let invalid_year = || AppError::BadRequest("Invalid year".to_string());
    let start = Utc
        .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(invalid_year)?;
    let end = Utc
        .with_ymd_and_hms(year, 12, 31, 23, 59, 59)
        .single()
        .ok_or_else(invalid_year)?;

    let rows = MonthlyPlanRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::Postgres,
        r#"
        SELECT EXTRACT(MONTH FROM start_date)::int AS month,
               COUNT(*) AS num_tour_starts,
               ARRAY_AGG(t.name) AS tours
        FROM tour t
        CROSS JOIN UNNEST(t.start_dates) AS start_date
        WHERE start_date BETWEEN $1 AND $2
          AND t.secret_tour = FALSE
        GROUP BY month
        ORDER BY num_tour_starts DESC, month ASC
        LIMIT 12
        "#,
        [start.into(), end.into()],
    ))
    .all(&state.db)
    .await?;

    Ok(Json(
        json!({ "status": "success", "results": rows.len(), "data": { "plan": rows } }),
    ))
}

fn parse_latlng(raw: &str) -> AppResult<(f64, f64)> {
    let invalid = || {
        AppError::BadRequest(
            "Please provide latitude and longitude in the format lat,lng".to_string(),
        )
    };
    let (lat, lng) = raw.split_once(',').ok_or_else(invalid)?;
    let lat = lat.trim().parse().map_err(|_| invalid())?;
    let lng = lng.trim().parse().map_err(|_| invalid())?;
    Ok((lat, lng))
}

/// Tours starting within a radius of a center point
pub async fn tours_within(
    State(state): State<AppState>,
    Path((distance, latlng, unit)): Path<(f64, String, String)>,
) -> AppResult<Json<JsonValue>> {
    let (lat, lng) = parse_latlng(&latlng)?;
    let radius_km = match unit.as_str() {
        "km" => distance,
        "mi" => distance * MILES_TO_KM,
        _ => return Err(AppError::BadRequest("Unit must be either mi or km".to_string())),
    };

    let tours = tour::Entity::find()
        .filter(TourResource::default_scope())
        .filter(tour::Column::StartLocation.is_not_null())
        .all(&state.db)
        .await?;

    let matching: Vec<JsonValue> = tours
        .into_iter()
        .filter(|t| {
            t.start_location
                .as_ref()
                .is_some_and(|loc| is_within_radius(loc.lat(), loc.lng(), lat, lng, radius_km))
        })
        .map(|t| serde_json::to_value(&t))
        .collect::<Result<_, _>>()?;

    Ok(Json(factory::success_many("tours", matching)))
}

#[cfg(test)]
mod tests {
    use sea_orm::QueryTrait;

    use super::*;

    fn minimal_payload() -> CreateTourRequest {
        serde_json::from_value(json!({
            "name": "Ten Char Min",
            "duration": 5,
            "max_group_size": 10,
            "difficulty": "easy",
            "price": 100,
            "summary": "s",
            "image_cover": "x"
        }))
        .unwrap()
    }

    fn existing_tour() -> tour::Model {
        tour::Model {
            id: Uuid::new_v4(),
            name: "The Sea Explorer".to_string(),
            slug: "the-sea-explorer".to_string(),
            duration: 7,
            max_group_size: 15,
            difficulty: Difficulty::Medium,
            ratings_average: 4.5,
            ratings_quantity: 0,
            price: 100.0,
            price_discount: None,
            summary: "Exploring the jaw-dropping US east coast by foot and by boat".to_string(),
            description: None,
            image_cover: "tour-2-cover.jpg".to_string(),
            images: None,
            start_dates: None,
            secret_tour: false,
            start_location: None,
            locations: None,
            created_at: "2025-05-20T08:00:00+00:00".parse().unwrap(),
        }
    }

    #[test]
    fn minimal_create_payload_is_valid() {
        let payload = minimal_payload();
        assert!(TourResource::validate_create(&payload).is_ok());
        assert_eq!(payload.difficulty, Difficulty::Easy);
    }

    #[test]
    fn create_model_derives_slug_and_leaves_rating_defaults() {
        let model = TourResource::create_model(minimal_payload()).unwrap();
        assert_eq!(model.slug.clone().unwrap(), "ten-char-min");
        assert!(model.ratings_average.is_not_set());
        assert!(model.ratings_quantity.is_not_set());
    }

    #[test]
    fn short_names_are_rejected() {
        let mut payload = minimal_payload();
        payload.name = "Too short".to_string();
        let err = TourResource::validate_create(&payload).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn discount_must_be_below_price() {
        let mut payload = minimal_payload();
        payload.price_discount = Some(100.0);
        assert!(TourResource::validate_create(&payload).is_err());

        payload.price_discount = Some(99.0);
        assert!(TourResource::validate_create(&payload).is_ok());
    }

    #[test]
    fn update_discount_is_checked_against_merged_price() {
        let existing = existing_tour();

        // Patch discount alone against the stored price of 100.
        let patch: UpdateTourRequest =
            serde_json::from_value(json!({ "price_discount": 150 })).unwrap();
        assert!(TourResource::validate_update(&existing, &patch).is_err());

        // Raising the price in the same patch makes the discount valid.
        let patch: UpdateTourRequest =
            serde_json::from_value(json!({ "price": 200, "price_discount": 150 })).unwrap();
        assert!(TourResource::validate_update(&existing, &patch).is_ok());
    }

    #[test]
    fn default_scope_excludes_secret_tours() {
        let sql = tour::Entity::find()
            .filter(TourResource::default_scope())
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#""tour"."secret_tour" = FALSE"#), "{sql}");
    }

    #[test]
    fn top_tours_params_override_caller_values() {
        let mut params = HashMap::new();
        params.insert("limit".to_string(), "500".to_string());
        params.insert("page".to_string(), "1".to_string());

        let params = top_tours_params(params);
        assert_eq!(params["limit"], "5");
        assert_eq!(params["sort"], "-ratings_average,price");
        assert_eq!(params["page"], "1");
    }

    #[test]
    fn latlng_parsing() {
        assert_eq!(parse_latlng("45.9,6.86").unwrap(), (45.9, 6.86));
        assert!(parse_latlng("45.9").is_err());
        assert!(parse_latlng("north,south").is_err());
    }
}
