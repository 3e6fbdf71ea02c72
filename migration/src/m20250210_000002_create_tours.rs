use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create difficulty enum
        manager
            .create_type(
                Type::create()
                    .as_enum(Difficulty::Enum)
                    .values([Difficulty::Easy, Difficulty::Medium, Difficulty::Difficult])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tour::Table)
                    .if_not_exists()
                    .col(uuid(Tour::Id).primary_key())
                    .col(string_len(Tour::Name, 40).not_null().unique_key())
                    .col(string_len(Tour::Slug, 64).not_null())
                    .col(integer(Tour::Duration).not_null())
                    .col(integer(Tour::MaxGroupSize).not_null())
                    .col(
                        ColumnDef::new(Tour::Difficulty)
                            .custom(Difficulty::Enum)
                            .not_null(),
                    )
                    .col(double(Tour::RatingsAverage).not_null().default(4.5))
                    .col(integer(Tour::RatingsQuantity).not_null().default(0))
                    .col(double(Tour::Price).not_null())
                    .col(double_null(Tour::PriceDiscount))
                    .col(text(Tour::Summary).not_null())
                    .col(text_null(Tour::Description))
                    .col(string_len(Tour::ImageCover, 255).not_null())
                    .col(ColumnDef::new(Tour::Images).array(ColumnType::Text).null())
                    .col(
                        ColumnDef::new(Tour::StartDates)
                            .array(ColumnType::TimestampWithTimeZone)
                            .null(),
                    )
                    .col(boolean(Tour::SecretTour).not_null().default(false))
                    .col(json_binary_null(Tour::StartLocation))
                    .col(json_binary_null(Tour::Locations))
                    .col(
                        timestamp_with_time_zone(Tour::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tour_slug")
                    .table(Tour::Table)
                    .col(Tour::Slug)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tour_price_ratings")
                    .table(Tour::Table)
                    .col(Tour::Price)
                    .col(Tour::RatingsAverage)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tour::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(Difficulty::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Tour {
    Table,
    Id,
    Name,
    Slug,
    Duration,
    MaxGroupSize,
    Difficulty,
    RatingsAverage,
    RatingsQuantity,
    Price,
    PriceDiscount,
    Summary,
    Description,
    ImageCover,
    Images,
    StartDates,
    SecretTour,
    StartLocation,
    Locations,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum Difficulty {
    #[sea_orm(iden = "difficulty")]
    Enum,
    #[sea_orm(iden = "easy")]
    Easy,
    #[sea_orm(iden = "medium")]
    Medium,
    #[sea_orm(iden = "difficult")]
    Difficult,
}
