use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Rating shown for tours that have not been reviewed yet.
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "difficulty")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[sea_orm(string_value = "easy")]
    Easy,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "difficult")]
    Difficult,
}

/// GeoJSON-style point. Coordinates are [longitude, latitude].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct GeoPoint {
    pub coordinates: [f64; 2],
    pub address: Option<String>,
    pub description: Option<String>,
}

impl GeoPoint {
    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

/// A stop along the tour route, tagged with the day it is reached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Waypoint {
    pub coordinates: [f64; 2],
    pub address: Option<String>,
    pub description: Option<String>,
    pub day: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Waypoints(pub Vec<Waypoint>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tour")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Option<Vec<String>>,
    pub start_dates: Option<Vec<DateTimeWithTimeZone>>,
    /// Secret tours are excluded from every default read path.
    pub secret_tour: bool,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub start_location: Option<GeoPoint>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub locations: Option<Waypoints>,
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Derived on read, never persisted.
    pub fn duration_weeks(&self) -> f64 {
        f64::from(self.duration) / 7.0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
    #[sea_orm(has_many = "super::tour_guide::Entity")]
    TourGuides,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        super::tour_guide::Relation::User.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::tour_guide::Relation::Tour.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
