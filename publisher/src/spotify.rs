//! Facilities for publishing playlists to Spotify.

use crate::playlist::{PublishedPlaylist, PublishedPlaylistId};
use anyhow::Error;
use async_trait::async_trait;
use clap::Args;
use serde::Serialize;
use std::time::Duration;

pub mod auth;
mod client;
mod error;
pub mod mock;
mod transport;

pub use client::Client;
pub use error::ClientError;
pub use transport::{Body, HttpRequest, HttpResponse, Method, SurfTransport, Transport, TransportError};

/// Base URL of the Spotify Web API.
///
/// Spotify pagination always returns absolute URLs, so requests are always made with absolute
/// URLs rather than relative to a configured base.
pub const BASE_URL: &str = "https://api.spotify.com/v1";

/// The account our playlists are published under.
pub const DEFAULT_USER_ID: &str = "w6hfc0hfa4s53j4l44mqn2ppe";

/// A Spotify account to which playlists can be published.
#[async_trait]
pub trait Spotify: Send + Sync {
    /// Fetch the playlists owned by the publishing account, with their tracks.
    ///
    /// If `at_most` is given, only that many playlists are fetched.
    async fn get_published_playlists(
        &self,
        at_most: Option<usize>,
    ) -> Result<Vec<PublishedPlaylist>, Error>;

    /// Create a new, empty, public playlist.
    async fn create_playlist(&self, name: &str) -> Result<PublishedPlaylistId, Error>;

    /// Stop following (and thus delete) one of our playlists.
    async fn unsubscribe_from_playlist(&self, playlist_id: &PublishedPlaylistId)
        -> Result<(), Error>;

    /// Change the name or description of a playlist.
    async fn change_playlist_details(
        &self,
        playlist_id: &PublishedPlaylistId,
        details: &Details,
    ) -> Result<(), Error>;

    /// Append tracks to a playlist.
    async fn add_items(
        &self,
        playlist_id: &PublishedPlaylistId,
        track_ids: &[String],
    ) -> Result<(), Error>;

    /// Remove all occurrences of the given tracks from a playlist.
    async fn remove_items(
        &self,
        playlist_id: &PublishedPlaylistId,
        track_ids: &[String],
    ) -> Result<(), Error>;
}

/// Playlist details which can be changed after creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Details {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Credentials of the Spotify application.
#[derive(Clone, Debug, Args)]
pub struct Credentials {
    /// Client ID of the Spotify application.
    #[clap(
        long,
        env = "SPOTIFY_CLIENT_ID",
        value_parser = non_empty,
        hide_env_values = true
    )]
    pub client_id: String,

    /// Client secret of the Spotify application.
    #[clap(
        long,
        env = "SPOTIFY_CLIENT_SECRET",
        value_parser = non_empty,
        hide_env_values = true
    )]
    pub client_secret: String,
}

/// Options for connecting to Spotify as the publishing user.
#[derive(Clone, Debug, Args)]
#[group(skip)]
pub struct Options {
    #[clap(flatten)]
    pub credentials: Credentials,

    /// Refresh token for the publishing user, obtained with the `login` command.
    #[clap(
        long,
        env = "SPOTIFY_REFRESH_TOKEN",
        value_parser = non_empty,
        hide_env_values = true
    )]
    pub refresh_token: String,

    /// ID of the user who owns the published playlists.
    #[clap(long, env = "SPOTIFY_USER_ID", default_value = DEFAULT_USER_ID)]
    pub user_id: String,

    /// Total time, in seconds, to spend backing off from failed requests before giving up.
    #[clap(
        long,
        env = "SPOTIFY_RETRY_BUDGET",
        default_value = "300",
        value_parser = parse_seconds,
        value_name = "SECONDS"
    )]
    pub retry_budget: Duration,

    /// Timeout, in seconds, for each HTTP request.
    #[clap(
        long,
        env = "SPOTIFY_TIMEOUT",
        default_value = "30",
        value_parser = parse_seconds,
        value_name = "SECONDS"
    )]
    pub timeout: Duration,
}

impl Options {
    /// Create a client for the Spotify Web API.
    pub fn connect(&self) -> Result<Client, Error> {
        Ok(Client::new(SurfTransport::new(self.timeout)?, self))
    }
}

pub(crate) fn non_empty(s: &str) -> Result<String, String> {
    if s.is_empty() {
        Err("value must not be empty".into())
    } else {
        Ok(s.into())
    }
}

pub(crate) fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|err| format!("invalid number {s}: {err}"))?;
    Duration::try_from_secs_f64(secs).map_err(|err| format!("invalid duration {s}: {err}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_seconds("1.5").unwrap(), Duration::from_millis(1500));
        parse_seconds("-1").unwrap_err();
        parse_seconds("forever").unwrap_err();
        parse_seconds("1e30").unwrap_err();
        parse_seconds("NaN").unwrap_err();
    }

    #[test]
    fn test_details_json() {
        let details = Details {
            description: Some("new description".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(details).unwrap(),
            serde_json::json!({"description": "new description"})
        );
    }
}
