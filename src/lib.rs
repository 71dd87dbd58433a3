pub mod api;
pub mod auth;
pub mod budgets;
pub mod categories;
pub mod config;
pub mod error;
pub mod password;
pub mod stats;
pub mod telemetry;
pub mod transactions;
pub mod users;

