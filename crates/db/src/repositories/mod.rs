//! Database repositories.

mod delivery_target;
mod fetch_task;
mod inbox_queue;
mod inbox_status;

pub use delivery_target::DeliveryTargetRepository;
pub use fetch_task::FetchTaskRepository;
pub use inbox_queue::InboxQueueRepository;
pub use inbox_status::InboxStatusRepository;
