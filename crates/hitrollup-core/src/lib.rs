pub mod aggregate;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod dimension;
pub mod error;
pub mod hit;
pub mod stats;
