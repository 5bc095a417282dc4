pub mod api;
pub mod client;
pub mod cohorts;
pub mod config;
pub mod definitions;
pub mod flags;
pub mod local_evaluator;
pub mod metrics_consts;
pub mod properties;

// Fixtures shared by unit and integration tests
pub mod test_utils;
