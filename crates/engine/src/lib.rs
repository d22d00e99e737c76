//! Alert dispatch engine.
//!
//! Events are turned into persisted alert records by the [`factory`], and the
//! [`dispatcher`] sweeps pending records, claiming each one before handing it
//! to its delivery backend.

pub mod alert_type;
pub mod backend;
pub mod dispatcher;
pub mod factory;
pub mod memory;
pub mod postgres;
pub mod preferences;
pub mod registry;
pub mod store;
