//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod documents;
pub mod profile;
pub mod students;
