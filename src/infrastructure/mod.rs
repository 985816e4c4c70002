//! Infrastructure layer - Store adapters, facade, logging and metrics

pub mod cache;
pub mod logging;
pub mod observability;
