//! Create fetch task table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FetchTask::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FetchTask::Url)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FetchTask::TaskId).big_integer().null())
                    .col(
                        ColumnDef::new(FetchTask::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FetchTask::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum FetchTask {
    Table,
    Url,
    TaskId,
    CreatedAt,
}
