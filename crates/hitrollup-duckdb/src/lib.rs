pub mod backend;
mod dimensions;
pub mod hits;
pub mod schema;
pub mod site;
mod store_impl;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `hitrollup_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
