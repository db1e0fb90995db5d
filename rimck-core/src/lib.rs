// SPDX-License-Identifier: MIT

//! Engine of the `rimck` filesystem check front-end.
//!
//! [`catalog`] turns a filesystem table into a worklist, [`sched`] walks it
//! pass by pass while keeping at most one checker per disk, and [`checker`]
//! runs and reaps the `fsck.<type>` programs themselves.

pub mod catalog;
pub mod checker;
pub mod config;
pub mod disk;
pub mod error;
pub mod exit;
pub mod sched;
pub mod utils;

pub use catalog::{FilesystemCatalog, TableEntry, TypeFilter};
pub use checker::{CheckerLocator, CheckerSupervisor, StatsReporter, SupervisorOptions};
pub use config::RunOptions;
pub use disk::{DiskId, DiskTopology, SysfsTopology};
pub use error::{CoreError, CoreResult};
pub use exit::ExitStatus;
pub use sched::{CancelToken, RunMode, Scheduler, SchedulerOptions};
