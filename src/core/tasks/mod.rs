// src/core/tasks/mod.rs

//! Long-running background tasks.

pub mod statistics;
