pub mod config;
pub mod correlator;
pub mod db;
pub mod events;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod models;
pub mod money;
pub mod repos;
pub mod routes;
pub mod services;
pub mod validation;

pub use services::ledger;
pub use services::reconciliation::{ReconcileOutcome, ReconciliationEngine};
