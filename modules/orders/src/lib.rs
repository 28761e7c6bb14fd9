pub mod config;
pub mod consumer_task;
pub mod db;
pub mod dlq;
pub mod events;
pub mod health;
pub mod models;
pub mod repos;
pub mod routes;
pub mod services;

pub use consumer_task::start_payment_consumer;
pub use services::lifecycle;
