/// Re-export `Config` from `hitrollup-core` for use within this crate.
///
/// All environment-variable parsing lives in `hitrollup-core` so integration
/// tests can build a `Config` without depending on the full server.
pub use hitrollup_core::config::Config;
