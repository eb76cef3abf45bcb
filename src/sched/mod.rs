//! Scheduler bookkeeping structures.

pub mod queue;

pub use queue::{ReadyQueue, SleepSet};
