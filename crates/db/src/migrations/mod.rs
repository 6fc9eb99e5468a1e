//! Database migrations.
//!
//! Schema migrations for the federation pipeline tables.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20260101_000001_create_inbox_entry_table;
mod m20260101_000002_create_inbox_entry_receiver_table;
mod m20260101_000003_create_fetch_task_table;
mod m20260101_000004_create_delivery_target_table;
mod m20260101_000005_create_inbox_status_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_inbox_entry_table::Migration),
            Box::new(m20260101_000002_create_inbox_entry_receiver_table::Migration),
            Box::new(m20260101_000003_create_fetch_task_table::Migration),
            Box::new(m20260101_000004_create_delivery_target_table::Migration),
            Box::new(m20260101_000005_create_inbox_status_table::Migration),
        ]
    }
}
