//! Database entities.

#![allow(missing_docs)]

pub mod delivery_target;
pub mod fetch_task;
pub mod inbox_entry;
pub mod inbox_entry_receiver;
pub mod inbox_status;

pub use delivery_target::Entity as DeliveryTarget;
pub use fetch_task::Entity as FetchTask;
pub use inbox_entry::Entity as InboxEntry;
pub use inbox_entry_receiver::Entity as InboxEntryReceiver;
pub use inbox_status::Entity as InboxStatus;
