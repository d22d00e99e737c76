//! Shared types, errors and infrastructure for the relay workspace.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
