//! Playlist data shared by the archive and Spotify.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The ID of a playlist in the scraped archive.
///
/// This is the file stem of the playlist's JSON file, which is also the ID of the original
/// playlist on Spotify.
#[derive(
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Deserialize,
    Serialize,
)]
#[serde(transparent)]
pub struct ScrapedPlaylistId(String);

impl ScrapedPlaylistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The ID of a playlist we have published to Spotify.
#[derive(
    Clone,
    Debug,
    Display,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    From,
    Into,
    Deserialize,
    Serialize,
)]
#[serde(transparent)]
pub struct PublishedPlaylistId(String);

impl PublishedPlaylistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A playlist with a set of tracks.
///
/// Track IDs are bare Spotify IDs, without the `spotify:track:` prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Playlist<Id> {
    pub playlist_id: Id,
    pub name: String,
    pub description: String,
    pub track_ids: BTreeSet<String>,
}

/// A playlist read from the archive.
pub type ScrapedPlaylist = Playlist<ScrapedPlaylistId>;

/// A playlist that exists on the publishing Spotify account.
pub type PublishedPlaylist = Playlist<PublishedPlaylistId>;
