pub use sea_orm_migration::prelude::*;

mod m20250210_000001_create_users;
mod m20250210_000002_create_tours;
mod m20250210_000003_create_reviews;
mod m20250210_000004_create_tour_guides;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250210_000001_create_users::Migration),
            Box::new(m20250210_000002_create_tours::Migration),
            Box::new(m20250210_000003_create_reviews::Migration),
            Box::new(m20250210_000004_create_tour_guides::Migration),
        ]
    }
}
