//! Nightly scheduling: cron evaluation, run coalescing and history.

pub mod cron;
pub mod engine;
pub mod guard;
pub mod history;

pub use self::cron::NightlyScheduler;
pub use self::engine::{run_loop, NightlyRunner};
pub use self::guard::{RunGuard, RunPermit};
pub use self::history::{HistoryEntry, RunStatus, RunTrigger};
