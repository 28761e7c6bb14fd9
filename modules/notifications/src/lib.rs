pub mod config;
pub mod consumer_tasks;
pub mod db;
pub mod dlq;
pub mod events;
pub mod handlers;
pub mod health;
pub mod models;
pub mod notifier;
pub mod repos;
pub mod routes;

pub use consumer_tasks::start_consumers;
pub use notifier::{LogNotifier, Notifier};
