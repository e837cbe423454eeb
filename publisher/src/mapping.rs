//! The persistent mapping from scraped playlists to the playlists published for them.
//!
//! The mapping is stored as `playlists.json` at the root of the repository, so that the same
//! Spotify playlist is updated on every run instead of being recreated.

use crate::playlist::{PublishedPlaylistId, ScrapedPlaylistId};
use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// The name of the mapping file, relative to the repository root.
pub const FILE_NAME: &str = "playlists.json";

/// The playlists published for a single scraped playlist.
// Fields are declared in alphabetical order so that serialized keys are sorted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlaylistMapping {
    pub published_playlist_ids: Vec<PublishedPlaylistId>,
    pub scraped_playlist_id: ScrapedPlaylistId,
}

/// All playlist mappings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Playlists {
    pub mappings: Vec<PlaylistMapping>,
}

impl Playlists {
    /// Serialize as pretty-printed JSON with sorted keys.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate serialized mappings.
    ///
    /// No published playlist may be mapped twice, and no scraped playlist may appear in more than
    /// one mapping.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let playlists: Self = serde_json::from_str(json)?;
        playlists.validate()?;
        Ok(playlists)
    }

    /// Load mappings from `repo_dir`, or an empty set of mappings if there is no mapping file.
    pub fn load(repo_dir: impl AsRef<Path>) -> Result<Self, Error> {
        let path = repo_dir.as_ref().join(FILE_NAME);
        match fs::read_to_string(&path) {
            Ok(json) => Self::from_json(&json)
                .map_err(|err| Error::msg(format!("{} is invalid: {err}", path.display()))),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!("{} does not exist, starting from scratch", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Save mappings to `repo_dir`.
    pub fn save(&self, repo_dir: impl AsRef<Path>) -> Result<(), Error> {
        let path = repo_dir.as_ref().join(FILE_NAME);
        fs::write(&path, self.to_json()? + "\n")?;
        tracing::info!("wrote {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<(), Error> {
        let mut scraped = HashSet::new();
        let mut published = HashSet::new();
        for mapping in &self.mappings {
            if !scraped.insert(&mapping.scraped_playlist_id) {
                return Err(Error::msg(format!(
                    "scraped playlist {} is mapped more than once",
                    mapping.scraped_playlist_id
                )));
            }
            for id in &mapping.published_playlist_ids {
                if !published.insert(id) {
                    return Err(Error::msg(format!(
                        "published playlist {id} is mapped more than once"
                    )));
                }
            }
        }
        Ok(())
    }
}
