//! Worker runtime primitives for shellkeep.
//!
//! Small building blocks the session coordinator is assembled from:
//! classified spawn helpers, the unbounded single-consumer [`work_queue`],
//! [`TaskJoin`] for joining background tasks from several callers, and panic
//! payload extraction.

mod class;
mod join;
mod panic;
mod queue;
mod spawn;

pub use class::TaskClass;
pub use join::TaskJoin;
pub use panic::{join_error_panic_message, panic_message};
pub use queue::{QueueClosed, QueueReceiver, QueueSender, Recv, work_queue};
pub use spawn::{spawn, spawn_blocking, spawn_named_thread};
