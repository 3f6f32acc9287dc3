pub mod app;
pub mod auth;
pub mod buffer;
pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod tasks;
