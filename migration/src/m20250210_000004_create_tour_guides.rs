use sea_orm_migration::{prelude::*, schema::*};

use super::m20250210_000001_create_users::User;
use super::m20250210_000002_create_tours::Tour;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TourGuide::Table)
                    .if_not_exists()
                    .col(uuid(TourGuide::TourId).not_null())
                    .col(uuid(TourGuide::UserId).not_null())
                    .primary_key(
                        Index::create()
                            .col(TourGuide::TourId)
                            .col(TourGuide::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tour_guide_tour")
                            .from(TourGuide::Table, TourGuide::TourId)
                            .to(Tour::Table, Tour::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tour_guide_user")
                            .from(TourGuide::Table, TourGuide::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TourGuide::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum TourGuide {
    Table,
    TourId,
    UserId,
}
