//! Controller concurrency core
//!
//! Contains the building blocks shared by every audio subsystem:
//! - Single-slot "last command wins" mailbox
//! - Indexed resource slots with per-slot error tracking
//! - Worker loop and its state machine
//! - Controller handle with liveness probe and cooperative shutdown

pub mod handle;
pub mod mailbox;
pub mod slots;
pub mod worker;

pub use handle::Controller;
pub use mailbox::{Mailbox, MailboxStats};
pub use slots::{SlotStatus, SlotTable, SlotsSnapshot};
pub use worker::{Subsystem, WorkerState};
