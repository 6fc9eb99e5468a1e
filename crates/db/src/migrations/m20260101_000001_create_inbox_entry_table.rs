//! Create inbox entry table for the inbound queue.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InboxEntry::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InboxEntry::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InboxEntry::ActivityId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(InboxEntry::ObjectId).string().null())
                    .col(ColumnDef::new(InboxEntry::ObjectType).string_len(64).null())
                    .col(
                        ColumnDef::new(InboxEntry::ActivityType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(InboxEntry::InReplyToId).string().null())
                    .col(ColumnDef::new(InboxEntry::Conversation).string().null())
                    .col(ColumnDef::new(InboxEntry::Activity).json_binary().not_null())
                    .col(ColumnDef::new(InboxEntry::Signer).string().null())
                    .col(
                        ColumnDef::new(InboxEntry::Push)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(InboxEntry::Trusted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(InboxEntry::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(InboxEntry::TaskId).big_integer().null())
                    .to_owned(),
            )
            .await?;

        // Dependency checks look entries up by the object they carry
        manager
            .create_index(
                Index::create()
                    .name("idx_inbox_entry_object_id")
                    .table(InboxEntry::Table)
                    .col(InboxEntry::ObjectId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inbox_entry_in_reply_to_id")
                    .table(InboxEntry::Table)
                    .col(InboxEntry::InReplyToId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inbox_entry_received_at")
                    .table(InboxEntry::Table)
                    .col(InboxEntry::ReceivedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inbox_entry_task_id")
                    .table(InboxEntry::Table)
                    .col(InboxEntry::TaskId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InboxEntry::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum InboxEntry {
    Table,
    Id,
    ActivityId,
    ObjectId,
    ObjectType,
    ActivityType,
    InReplyToId,
    Conversation,
    Activity,
    Signer,
    Push,
    Trusted,
    ReceivedAt,
    TaskId,
}
