//! Keep the list of published playlists in `README.md` up to date.

use crate::playlist::PublishedPlaylistId;
use anyhow::Error;
use std::fs;
use std::path::Path;

/// The name of the README, relative to the repository root.
pub const FILE_NAME: &str = "README.md";

/// Everything after this heading is replaced by the list of playlists.
const PLAYLISTS_HEADING: &str = "## Playlists";

const PLAYLIST_URL: &str = "https://open.spotify.com/playlist";

/// Rewrite the playlist section of a README.
///
/// `links` pairs each published playlist with the name to show for it. The rendered list is
/// sorted by name (ignoring case), then by ID.
pub fn update_readme<'a, I>(contents: &str, links: I) -> Result<String, Error>
where
    I: IntoIterator<Item = (&'a PublishedPlaylistId, &'a str)>,
{
    let mut lines = contents.lines();
    let mut out = String::new();
    for line in lines.by_ref() {
        out.push_str(line);
        out.push('\n');
        if line == PLAYLISTS_HEADING {
            break;
        }
    }
    if !out.ends_with(&format!("{PLAYLISTS_HEADING}\n")) {
        return Err(Error::msg(format!(
            "README has no \"{PLAYLISTS_HEADING}\" section"
        )));
    }
    out.push('\n');

    let mut links = links
        .into_iter()
        .map(|(id, name)| (name.trim(), id))
        .collect::<Vec<_>>();
    links.sort_by(|(name1, id1), (name2, id2)| {
        name1
            .to_lowercase()
            .cmp(&name2.to_lowercase())
            .then_with(|| id1.cmp(id2))
    });
    for (name, id) in links {
        out.push_str(&format!("- [{}]({PLAYLIST_URL}/{id})\n", escape_markdown(name)));
    }

    Ok(out)
}

/// Rewrite the playlist section of the README in `repo_dir`.
pub fn update<'a, I>(repo_dir: impl AsRef<Path>, links: I) -> Result<(), Error>
where
    I: IntoIterator<Item = (&'a PublishedPlaylistId, &'a str)>,
{
    let path = repo_dir.as_ref().join(FILE_NAME);
    let contents = fs::read_to_string(&path)
        .map_err(|err| Error::msg(format!("unable to read {}: {err}", path.display())))?;
    fs::write(&path, update_readme(&contents, links)?)?;
    tracing::info!("wrote {}", path.display());
    Ok(())
}

fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '`', '*', '_', '{', '}', '[', ']', '<', '>', '(', ')', '#', '+', '-', '.', '!', '|',
    ];
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
