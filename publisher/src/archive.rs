//! Read scraped playlists from a local archive.
//!
//! The archive is a directory with the structure
//!
//! ```text
//! DIR/
//!     cumulative/
//!         <playlist ID>.json
//! ```
//!
//! where each JSON file describes one cumulative playlist.

use crate::playlist::{ScrapedPlaylist, ScrapedPlaylistId};
use anyhow::Error;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Suffix appended to the name of every published cumulative playlist.
pub const CUMULATIVE_SUFFIX: &str = " (Cumulative)";

/// A playlist file as stored in the archive.
///
/// Only the fields we need are parsed; the archive stores plenty more.
#[derive(Clone, Debug, Deserialize)]
struct PlaylistFile {
    name: String,
    description: String,
    tracks: Vec<TrackFile>,
}

#[derive(Clone, Debug, Deserialize)]
struct TrackFile {
    url: String,
}

/// Read every cumulative playlist from the archive at `playlists_dir`.
///
/// Any file that cannot be read or parsed is an error, rather than being skipped: a playlist
/// missing from the archive would otherwise be unpublished.
pub fn scraped_playlists(
    playlists_dir: impl AsRef<Path>,
) -> Result<BTreeMap<ScrapedPlaylistId, ScrapedPlaylist>, Error> {
    let dir = playlists_dir.as_ref().join("cumulative");
    tracing::info!("reading playlists from {}", dir.display());

    let mut playlists = BTreeMap::new();
    let entries = dir
        .read_dir()
        .map_err(|err| Error::msg(format!("unable to read directory {}: {err}", dir.display())))?;
    for dirent in entries {
        let path = dirent?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return Err(Error::msg(format!(
                "file {} has a malformed name",
                path.display()
            )));
        };
        let id = ScrapedPlaylistId::new(id);

        let file: PlaylistFile = serde_json::from_reader(BufReader::new(File::open(&path)?))
            .map_err(|err| Error::msg(format!("file {} is malformed: {err}", path.display())))?;
        let playlist = ScrapedPlaylist {
            playlist_id: id.clone(),
            name: format!("{}{CUMULATIVE_SUFFIX}", file.name),
            description: file.description,
            track_ids: file
                .tracks
                .iter()
                .map(|track| track_id(&track.url))
                .collect::<Result<_, _>>()?,
        };
        tracing::debug!(
            "playlist {id} ({}) has {} tracks",
            playlist.name,
            playlist.track_ids.len()
        );
        playlists.insert(id, playlist);
    }

    Ok(playlists)
}

/// Extract a track ID from a track URL such as `https://open.spotify.com/track/<id>`.
fn track_id(url: &str) -> Result<String, Error> {
    match url.rsplit('/').next() {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(Error::msg(format!("unable to extract track ID: {url}"))),
    }
}
