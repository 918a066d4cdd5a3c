//! Core logic for tend: recurrence patterns, task materialization and the
//! periodic trigger.

pub mod materialize;
pub mod recurrence;
pub mod scheduler;
pub mod store;
