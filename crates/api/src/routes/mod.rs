//! Route handlers

pub mod config;
pub mod history;
pub mod threats;
