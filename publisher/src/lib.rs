//! Publish an archive of cumulative playlists to Spotify.

use tracing_subscriber::EnvFilter;

pub mod archive;
pub mod git;
pub mod login;
pub mod mapping;
pub mod playlist;
pub mod publish;
pub mod readme;
pub mod spotify;

/// Install a global `tracing` subscriber.
///
/// The log level is taken from `RUST_LOG`, defaulting to `info`. Calling this more than once is
/// harmless; only the first call installs a subscriber.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
