//! PostgreSQL persistence for treatment plans and the tasks materialized
//! from them.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
