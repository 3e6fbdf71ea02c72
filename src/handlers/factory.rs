use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, Condition, DatabaseConnection, EntityTrait,
    IntoActiveModel, ModelTrait, PrimaryKeyTrait, QueryFilter,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue, json};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::utils::api_features::ApiFeatures;

/// Everything the generic CRUD operations need to know about a resource:
/// its entity types, request payloads, envelope names, the filter composed
/// into every read, and the hooks that build or patch documents.
pub trait CrudResource: Send + Sync + 'static
where
    <<Self::Entity as EntityTrait>::PrimaryKey as PrimaryKeyTrait>::ValueType: From<Uuid>,
{
    type Entity: EntityTrait<Model = Self::Model>;
    type Model: ModelTrait<Entity = Self::Entity>
        + IntoActiveModel<Self::ActiveModel>
        + Serialize
        + Clone
        + Send
        + Sync;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity>
        + ActiveModelBehavior
        + Send
        + 'static;
    type CreatePayload: DeserializeOwned + Send;
    type UpdatePayload: DeserializeOwned + Send;

    /// Envelope key for a single document.
    const SINGULAR: &'static str;
    /// Envelope key for a listing.
    const PLURAL: &'static str;
    /// Columns stripped from every projection.
    const HIDDEN_FIELDS: &'static [&'static str] = &[];

    /// Filter composed into every read path, list and lookup alike.
    fn default_scope() -> Condition {
        Condition::all()
    }

    fn validate_create(payload: &Self::CreatePayload) -> AppResult<()> {
        let _ = payload;
        Ok(())
    }

    /// Re-checks create-level rules against the merged state of an update.
    fn validate_update(existing: &Self::Model, patch: &Self::UpdatePayload) -> AppResult<()>;

    /// Builds the insertable document, assigning identity and derived fields.
    fn create_model(payload: Self::CreatePayload) -> AppResult<Self::ActiveModel>;

    /// Copies patch fields onto the active model.
    fn apply_update(model: &mut Self::ActiveModel, patch: Self::UpdatePayload);
}

fn parse_payload<T: DeserializeOwned>(payload: JsonValue) -> AppResult<T> {
    serde_json::from_value(payload).map_err(|e| AppError::Validation(vec![e.to_string()]))
}

pub fn success_one(key: &str, document: JsonValue) -> JsonValue {
    let mut data = Map::new();
    data.insert(key.to_string(), document);
    json!({ "status": "success", "data": data })
}

pub fn success_many(key: &str, documents: Vec<JsonValue>) -> JsonValue {
    let results = documents.len();
    let mut data = Map::new();
    data.insert(key.to_string(), JsonValue::Array(documents));
    json!({ "status": "success", "results": results, "data": data })
}

/// Runs the query pipeline over the resource's scoped base query, merging in
/// an optional parent filter (nested routes), and executes it.
pub async fn find_all<R: CrudResource>(
    db: &DatabaseConnection,
    params: HashMap<String, String>,
    scope: Option<Condition>,
) -> AppResult<Vec<JsonValue>> {
    let mut select = R::Entity::find().filter(R::default_scope());
    if let Some(condition) = scope {
        select = select.filter(condition);
    }

    let query = ApiFeatures::new(select, params)
        .hidden(R::HIDDEN_FIELDS)
        .apply()?;

    Ok(query.into_json().all(db).await?)
}

pub async fn fetch_one<R: CrudResource>(db: &DatabaseConnection, id: Uuid) -> AppResult<R::Model> {
    R::Entity::find_by_id(id)
        .filter(R::default_scope())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No {} found with that ID", R::SINGULAR)))
}

pub async fn create<R: CrudResource>(
    db: &DatabaseConnection,
    payload: JsonValue,
) -> AppResult<R::Model> {
    let payload: R::CreatePayload = parse_payload(payload)?;
    R::validate_create(&payload)?;

    Ok(R::create_model(payload)?.insert(db).await?)
}

pub async fn update<R: CrudResource>(
    db: &DatabaseConnection,
    id: Uuid,
    payload: JsonValue,
) -> AppResult<R::Model> {
    let patch: R::UpdatePayload = parse_payload(payload)?;
    let existing = fetch_one::<R>(db, id).await?;
    R::validate_update(&existing, &patch)?;

    let mut model = existing.clone().into_active_model();
    R::apply_update(&mut model, patch);
    if !model.is_changed() {
        return Ok(existing);
    }

    Ok(model.update(db).await?)
}

/// Deletes by id. The document is read first so callers can still use its
/// pre-deletion state (e.g. the parent reference of a removed review).
pub async fn remove<R: CrudResource>(db: &DatabaseConnection, id: Uuid) -> AppResult<R::Model> {
    let existing = fetch_one::<R>(db, id).await?;
    existing.clone().into_active_model().delete(db).await?;
    Ok(existing)
}

// Generic axum handlers, mountable per resource via turbofish.

pub async fn get_all<R: CrudResource>(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<JsonValue>> {
    let documents = find_all::<R>(&state.db, params, None).await?;
    Ok(Json(success_many(R::PLURAL, documents)))
}

pub async fn get_one<R: CrudResource>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<JsonValue>> {
    let model = fetch_one::<R>(&state.db, id).await?;
    Ok(Json(success_one(R::SINGULAR, serde_json::to_value(&model)?)))
}

pub async fn create_one<R: CrudResource>(
    State(state): State<AppState>,
    Json(payload): Json<JsonValue>,
) -> AppResult<(StatusCode, Json<JsonValue>)> {
    let model = create::<R>(&state.db, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(success_one(R::SINGULAR, serde_json::to_value(&model)?)),
    ))
}

pub async fn update_one<R: CrudResource>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<JsonValue>,
) -> AppResult<Json<JsonValue>> {
    let model = update::<R>(&state.db, id, payload).await?;
    Ok(Json(success_one(R::SINGULAR, serde_json::to_value(&model)?)))
}

pub async fn delete_one<R: CrudResource>(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    remove::<R>(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase};

    use super::*;
    use crate::entities::tour::{self, Difficulty};
    use crate::handlers::tour::TourResource;

    fn sample_tour() -> tour::Model {
        tour::Model {
            id: Uuid::new_v4(),
            name: "The Forest Hiker".to_string(),
            slug: "the-forest-hiker".to_string(),
            duration: 5,
            max_group_size: 25,
            difficulty: Difficulty::Easy,
            ratings_average: 4.5,
            ratings_quantity: 0,
            price: 397.0,
            price_discount: None,
            summary: "Breathtaking hike through the Canadian Banff National Park".to_string(),
            description: None,
            image_cover: "tour-1-cover.jpg".to_string(),
            images: None,
            start_dates: None,
            secret_tour: false,
            start_location: None,
            locations: None,
            created_at: "2025-06-01T09:00:00+00:00".parse().unwrap(),
        }
    }

    #[test]
    fn envelopes_have_stable_shape() {
        let one = success_one("tour", json!({ "id": 1 }));
        assert_eq!(one["status"], "success");
        assert_eq!(one["data"]["tour"]["id"], 1);

        let many = success_many("tours", vec![json!({}), json!({})]);
        assert_eq!(many["status"], "success");
        assert_eq!(many["results"], 2);
        assert!(many["data"]["tours"].is_array());
    }

    #[tokio::test]
    async fn fetch_one_returns_not_found_for_missing_id() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<tour::Model>::new()])
            .into_connection();

        let result = fetch_one::<TourResource>(&db, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn fetch_one_returns_the_matching_document() {
        let tour = sample_tour();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![tour.clone()]])
            .into_connection();

        let found = fetch_one::<TourResource>(&db, tour.id).await.unwrap();
        assert_eq!(found.name, tour.name);
        assert_eq!(found.slug, "the-forest-hiker");
    }

    #[tokio::test]
    async fn remove_surfaces_not_found_before_deleting() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<tour::Model>::new()])
            .into_connection();

        let result = remove::<TourResource>(&db, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
