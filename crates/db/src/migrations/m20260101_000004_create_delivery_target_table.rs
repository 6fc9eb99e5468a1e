//! Create delivery target table for outbound fan-out.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryTarget::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryTarget::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTarget::UriId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryTarget::Inbox).string().not_null())
                    .col(
                        ColumnDef::new(DeliveryTarget::Failed)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeliveryTarget::Receivers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryTarget::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_target_uri_id_inbox")
                    .table(DeliveryTarget::Table)
                    .col(DeliveryTarget::UriId)
                    .col(DeliveryTarget::Inbox)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Batches are loaded per inbox
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_target_inbox")
                    .table(DeliveryTarget::Table)
                    .col(DeliveryTarget::Inbox)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryTarget::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum DeliveryTarget {
    Table,
    Id,
    UriId,
    Inbox,
    Failed,
    Receivers,
    CreatedAt,
}
