//! Create inbox entry receiver table.

use sea_orm_migration::prelude::*;

use super::m20260101_000001_create_inbox_entry_table::InboxEntry;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InboxEntryReceiver::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InboxEntryReceiver::QueueId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InboxEntryReceiver::Uid)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(InboxEntryReceiver::QueueId)
                            .col(InboxEntryReceiver::Uid),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_inbox_entry_receiver_queue_id")
                            .from(InboxEntryReceiver::Table, InboxEntryReceiver::QueueId)
                            .to(InboxEntry::Table, InboxEntry::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InboxEntryReceiver::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum InboxEntryReceiver {
    Table,
    QueueId,
    Uid,
}
