//! # nuget-sweep
//!
//! Removes package versions that have not been used for a while from a
//! NuGet-style package cache (`<root>/packages/<package>/<version>/`).
//!
//! - **Access-time based**: a version goes once its `.nupkg` has not been
//!   read within the retention window
//! - **Recoverable mode**: removed versions can be moved to a staging area
//!   and restored later
//! - **Non-fatal failures**: problems with one package or version are
//!   reported as events and the sweep carries on
//! - **Scheduler friendly**: quiet and JSON output for cron or launchd

pub mod cleaner;
pub mod cli;
pub mod common;

pub use cleaner::{CleanEvent, Cleaner, DeletionMode, RunStatus, RunSummary};
pub use common::errors::CleanerError;
