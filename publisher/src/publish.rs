//! Reconcile the published playlists with the archive.

use super::{
    archive, git,
    mapping::{PlaylistMapping, Playlists},
    playlist::{PublishedPlaylist, PublishedPlaylistId, ScrapedPlaylistId},
    readme,
    spotify::{self, Spotify},
};
use anyhow::Error;
use clap::Args;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Options for publishing playlists.
#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Path to the local playlists directory.
    ///
    /// This should be a directory with the structure
    ///
    /// ```text
    /// DIR/
    ///     cumulative/
    ///         <playlist ID>.json
    /// ```
    #[clap(
        long,
        env = "PUBLISHER_PLAYLISTS_DIR",
        value_name = "DIR",
        value_parser = directory
    )]
    pub playlists: PathBuf,

    /// Actually publish changes to Spotify.
    ///
    /// Without this flag, the changes that would be made are logged, and nothing is changed on
    /// Spotify or on disk.
    #[clap(long)]
    pub prod: bool,

    /// Only fetch up to N published playlists, to avoid rate limits while testing.
    #[clap(long, env = "PUBLISHER_AT_MOST", value_name = "N", conflicts_with = "prod")]
    pub at_most: Option<usize>,

    /// Root of the repository containing `playlists.json` and `README.md`.
    #[clap(
        long,
        env = "PUBLISHER_REPO_DIR",
        value_name = "DIR",
        default_value = ".",
        value_parser = directory
    )]
    pub repo_dir: PathBuf,

    #[clap(flatten)]
    pub spotify: spotify::Options,
}

/// Publish the archive to Spotify.
///
/// In production, the updated mapping and README are committed and pushed when running in GitHub
/// Actions.
pub async fn publish(opt: &Options) -> Result<(), Error> {
    let client = opt.spotify.connect()?;
    publish_impl(
        &client,
        &opt.playlists,
        &opt.repo_dir,
        opt.prod,
        opt.at_most,
    )
    .await?;
    if opt.prod {
        git::commit_and_push_if_github_actions(&opt.repo_dir, "Publish playlists")?;
    }
    Ok(())
}

/// Make the playlists on `spotify` match the archive in `playlists_dir`.
///
/// Every scraped playlist gets at least one published playlist, with exactly the tracks of the
/// scraped playlist. Published playlists which don't correspond to a scraped playlist are
/// unsubscribed from. The mapping in `repo_dir` is used to decide which published playlists
/// correspond to which scraped playlists, and is updated along with the README.
///
/// Unless `prod` is set, nothing is actually changed.
pub async fn publish_impl<S: Spotify>(
    spotify: &S,
    playlists_dir: &Path,
    repo_dir: &Path,
    prod: bool,
    at_most: Option<usize>,
) -> Result<(), Error> {
    let scraped = archive::scraped_playlists(playlists_dir)?;
    let published = spotify
        .get_published_playlists(at_most)
        .await?
        .into_iter()
        .map(|playlist| {
            let playlist = PublishedPlaylist {
                name: playlist.name.trim().to_string(),
                ..playlist
            };
            (playlist.playlist_id.clone(), playlist)
        })
        .collect::<BTreeMap<_, _>>();
    tracing::info!(
        "{} scraped playlists, {} published playlists",
        scraped.len(),
        published.len()
    );

    // Keep only the parts of the existing mapping which refer to playlists that still exist.
    let mut mappings: BTreeMap<ScrapedPlaylistId, Vec<PublishedPlaylistId>> = Default::default();
    for mapping in Playlists::load(repo_dir)?.mappings {
        if !scraped.contains_key(&mapping.scraped_playlist_id) {
            tracing::warn!(
                "scraped playlist {} no longer exists, dropping its mapping",
                mapping.scraped_playlist_id
            );
            continue;
        }
        let ids = mapping
            .published_playlist_ids
            .into_iter()
            .filter(|id| {
                let exists = published.contains_key(id);
                if !exists {
                    tracing::warn!(
                        "published playlist {id} for {} no longer exists",
                        mapping.scraped_playlist_id
                    );
                }
                exists
            })
            .collect::<Vec<_>>();
        if !ids.is_empty() {
            mappings.insert(mapping.scraped_playlist_id, ids);
        }
    }
    let referenced = mappings.values().flatten().collect::<HashSet<_>>();
    let unreferenced = published
        .keys()
        .filter(|id| !referenced.contains(id))
        .cloned()
        .collect::<Vec<_>>();

    // Create missing playlists.
    for (id, playlist) in &scraped {
        if mappings.contains_key(id) {
            continue;
        }
        tracing::info!("creating playlist: {}", playlist.name);
        let published_id = if prod {
            spotify.create_playlist(&playlist.name).await?
        } else {
            // When testing, just use a fake playlist ID.
            PublishedPlaylistId::new(format!("playlist_id:{}", playlist.name))
        };
        mappings.insert(id.clone(), vec![published_id]);
    }

    // Update tracks.
    let no_tracks = BTreeSet::new();
    for (id, published_ids) in &mappings {
        let scraped_tracks = &scraped[id].track_ids;
        for published_id in published_ids {
            let published_tracks = published
                .get(published_id)
                .map(|playlist| &playlist.track_ids)
                .unwrap_or(&no_tracks);
            let name = &scraped[id].name;

            let add = scraped_tracks
                .difference(published_tracks)
                .cloned()
                .collect::<Vec<_>>();
            if !add.is_empty() {
                tracing::info!("adding {} tracks to playlist: {name}", add.len());
                if prod {
                    spotify.add_items(published_id, &add).await?;
                }
            }

            let remove = published_tracks
                .difference(scraped_tracks)
                .cloned()
                .collect::<Vec<_>>();
            if !remove.is_empty() {
                tracing::info!("removing {} tracks from playlist: {name}", remove.len());
                if prod {
                    spotify.remove_items(published_id, &remove).await?;
                }
            }
        }
    }

    // Remove extra playlists.
    for id in &unreferenced {
        tracing::info!("unsubscribing from playlist: {} ({id})", published[id].name);
        if prod {
            spotify.unsubscribe_from_playlist(id).await?;
        }
    }

    if !prod {
        tracing::info!("not in production, leaving mapping and README untouched");
        return Ok(());
    }

    Playlists {
        mappings: mappings
            .iter()
            .map(|(id, published_ids)| PlaylistMapping {
                scraped_playlist_id: id.clone(),
                published_playlist_ids: published_ids.clone(),
            })
            .collect(),
    }
    .save(repo_dir)?;

    // Link each playlist under its name on Spotify, or, for new playlists, the name we just
    // created it with.
    let links = mappings.iter().flat_map(|(id, published_ids)| {
        let scraped_name = scraped[id].name.as_str();
        let published = &published;
        published_ids.iter().map(move |published_id| {
            let name = published
                .get(published_id)
                .map(|playlist| playlist.name.as_str())
                .unwrap_or(scraped_name);
            (published_id, name)
        })
    });
    readme::update(repo_dir, links)?;

    Ok(())
}

fn directory(arg: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(arg);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(format!("{arg} is not a valid directory"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mapping,
        playlist::ScrapedPlaylist,
        spotify::mock::{Call, MockSpotify},
    };
    use clap::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn published(id: &str, name: &str, tracks: &[&str]) -> PublishedPlaylist {
        PublishedPlaylist {
            playlist_id: PublishedPlaylistId::new(id),
            name: name.into(),
            description: format!("{name} description"),
            track_ids: tracks.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn write_scraped(dir: &Path, playlists: &[ScrapedPlaylist]) {
        let cumulative = dir.join("cumulative");
        fs::create_dir_all(&cumulative).unwrap();
        for playlist in playlists {
            let name = playlist
                .name
                .strip_suffix(archive::CUMULATIVE_SUFFIX)
                .unwrap();
            let tracks = playlist
                .track_ids
                .iter()
                .map(|id| serde_json::json!({ "url": format!("https://open.spotify.com/track/{id}") }))
                .collect::<Vec<_>>();
            fs::write(
                cumulative.join(format!("{}.json", playlist.playlist_id)),
                serde_json::json!({
                    "name": name,
                    "description": playlist.description,
                    "tracks": tracks,
                })
                .to_string(),
            )
            .unwrap();
        }
    }

    fn scraped(id: &str, name: &str, tracks: &[&str]) -> ScrapedPlaylist {
        ScrapedPlaylist {
            playlist_id: ScrapedPlaylistId::new(id),
            name: format!("{name} (Cumulative)"),
            description: format!("{name} description"),
            track_ids: tracks.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn id(id: &str) -> PublishedPlaylistId {
        PublishedPlaylistId::new(id)
    }

    fn tracks(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    struct Fixture {
        playlists_dir: TempDir,
        repo_dir: TempDir,
        spotify: MockSpotify,
    }

    impl Fixture {
        fn new() -> Self {
            let playlists_dir = TempDir::new().unwrap();
            write_scraped(
                playlists_dir.path(),
                &[
                    // Has a valid mapping.
                    scraped("scraped_1_id", "scraped_1_name", &["1", "2"]),
                    // Has an invalid mapping.
                    scraped("scraped_2_id", "scraped_2_name", &["123"]),
                    // Has no mapping.
                    scraped("scraped_3_id", "scraped_3_name", &["123"]),
                ],
            );

            let repo_dir = TempDir::new().unwrap();
            fs::write(
                repo_dir.path().join(readme::FILE_NAME),
                "Arbitrary text\n\n## Playlists\n",
            )
            .unwrap();
            fs::write(
                repo_dir.path().join(mapping::FILE_NAME),
                r#"{
                    "mappings": [
                        {
                            "scraped_playlist_id": "scraped_1_id",
                            "published_playlist_ids": ["published_1_id"]
                        },
                        {
                            "scraped_playlist_id": "scraped_2_id",
                            "published_playlist_ids": ["published_invalid_id"]
                        },
                        {
                            "scraped_playlist_id": "scraped_invalid_id",
                            "published_playlist_ids": ["published_2_id"]
                        }
                    ]
                }"#,
            )
            .unwrap();

            let spotify = MockSpotify::new([
                // Has a valid mapping; whitespace should be stripped from the name.
                published("published_1_id", "\t  published_1_name   ", &["2", "3"]),
                // Has an invalid mapping.
                published("published_2_id", "published_2_name", &["456"]),
                // Has no mapping.
                published("published_3_id", "published_3_name", &["456"]),
            ])
            .with_created("scraped_2_name (Cumulative)", "published_4_id")
            .with_created("scraped_3_name (Cumulative)", "published_5_id");

            Self {
                playlists_dir,
                repo_dir,
                spotify,
            }
        }

        async fn publish(&self, prod: bool, at_most: Option<usize>) -> Result<(), Error> {
            publish_impl(
                &self.spotify,
                self.playlists_dir.path(),
                self.repo_dir.path(),
                prod,
                at_most,
            )
            .await
        }

        fn read(&self, file: &str) -> String {
            fs::read_to_string(self.repo_dir.path().join(file)).unwrap()
        }
    }

    #[async_std::test]
    async fn test_publish() {
        let fixture = Fixture::new();
        fixture.publish(true, None).await.unwrap();

        assert_eq!(fixture.spotify.fetches(), [None]);
        assert_eq!(
            fixture.spotify.calls(),
            [
                Call::CreatePlaylist("scraped_2_name (Cumulative)".into()),
                Call::CreatePlaylist("scraped_3_name (Cumulative)".into()),
                Call::AddItems(id("published_1_id"), tracks(&["1"])),
                Call::RemoveItems(id("published_1_id"), tracks(&["3"])),
                Call::AddItems(id("published_4_id"), tracks(&["123"])),
                Call::AddItems(id("published_5_id"), tracks(&["123"])),
                Call::UnsubscribeFromPlaylist(id("published_2_id")),
                Call::UnsubscribeFromPlaylist(id("published_3_id")),
            ]
        );

        assert_eq!(
            fixture.read(readme::FILE_NAME),
            "Arbitrary text\n\
             \n\
             ## Playlists\n\
             \n\
             - [published\\_1\\_name](https://open.spotify.com/playlist/published_1_id)\n\
             - [scraped\\_2\\_name \\(Cumulative\\)](https://open.spotify.com/playlist/published_4_id)\n\
             - [scraped\\_3\\_name \\(Cumulative\\)](https://open.spotify.com/playlist/published_5_id)\n"
        );
        assert_eq!(
            fixture.read(mapping::FILE_NAME),
            r#"{
  "mappings": [
    {
      "published_playlist_ids": [
        "published_1_id"
      ],
      "scraped_playlist_id": "scraped_1_id"
    },
    {
      "published_playlist_ids": [
        "published_4_id"
      ],
      "scraped_playlist_id": "scraped_2_id"
    },
    {
      "published_playlist_ids": [
        "published_5_id"
      ],
      "scraped_playlist_id": "scraped_3_id"
    }
  ]
}
"#
        );
    }

    #[async_std::test]
    async fn test_publish_up_to_date() {
        let playlists_dir = TempDir::new().unwrap();
        write_scraped(
            playlists_dir.path(),
            &[scraped("scraped_id", "name", &["1", "2"])],
        );
        let repo_dir = TempDir::new().unwrap();
        fs::write(repo_dir.path().join(readme::FILE_NAME), "## Playlists\n").unwrap();
        fs::write(
            repo_dir.path().join(mapping::FILE_NAME),
            r#"{"mappings": [{"scraped_playlist_id": "scraped_id", "published_playlist_ids": ["published_id"]}]}"#,
        )
        .unwrap();
        let spotify = MockSpotify::new([published(
            "published_id",
            "name (Cumulative)",
            &["1", "2"],
        )]);

        publish_impl(&spotify, playlists_dir.path(), repo_dir.path(), true, None)
            .await
            .unwrap();
        assert!(spotify.calls().is_empty());
    }

    #[async_std::test]
    async fn test_dry_run() {
        let fixture = Fixture::new();
        let readme = fixture.read(readme::FILE_NAME);
        let mapping = fixture.read(mapping::FILE_NAME);

        fixture.publish(false, Some(1)).await.unwrap();
        assert_eq!(fixture.spotify.fetches(), [Some(1)]);
        assert!(fixture.spotify.calls().is_empty());
        assert_eq!(fixture.read(readme::FILE_NAME), readme);
        assert_eq!(fixture.read(mapping::FILE_NAME), mapping);
    }

    #[async_std::test]
    async fn test_missing_mapping() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.repo_dir.path().join(mapping::FILE_NAME)).unwrap();
        let spotify = MockSpotify::default()
            .with_created("scraped_1_name (Cumulative)", "a")
            .with_created("scraped_2_name (Cumulative)", "b")
            .with_created("scraped_3_name (Cumulative)", "c");

        publish_impl(
            &spotify,
            fixture.playlists_dir.path(),
            fixture.repo_dir.path(),
            true,
            None,
        )
        .await
        .unwrap();
        let playlists = Playlists::load(fixture.repo_dir.path()).unwrap();
        assert_eq!(
            playlists
                .mappings
                .iter()
                .map(|m| (m.scraped_playlist_id.as_str(), m.published_playlist_ids.clone()))
                .collect::<Vec<_>>(),
            [
                ("scraped_1_id", vec![id("a")]),
                ("scraped_2_id", vec![id("b")]),
                ("scraped_3_id", vec![id("c")]),
            ]
        );
    }

    #[async_std::test]
    async fn test_invalid_mapping_file() {
        let fixture = Fixture::new();
        fs::write(
            fixture.repo_dir.path().join(mapping::FILE_NAME),
            r#"{"mappings": [
                {"scraped_playlist_id": "a", "published_playlist_ids": ["x"]},
                {"scraped_playlist_id": "b", "published_playlist_ids": ["x"]}
            ]}"#,
        )
        .unwrap();
        fixture.publish(true, None).await.unwrap_err();
        assert!(fixture.spotify.calls().is_empty());
    }

    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[clap(flatten)]
        publish: Options,
    }

    fn parse_options(args: &[&str]) -> Result<Options, clap::Error> {
        use clap::Parser;
        Cli::try_parse_from(std::iter::once("publisher").chain(args.iter().copied()))
            .map(|cli| cli.publish)
    }

    fn args<'a>(dir: &'a Path, credentials: [&'a str; 3], rest: &[&'a str]) -> Vec<&'a str> {
        let [client_id, client_secret, refresh_token] = credentials;
        let mut args = vec![
            "--playlists",
            dir.to_str().unwrap(),
            "--client-id",
            client_id,
            "--client-secret",
            client_secret,
            "--refresh-token",
            refresh_token,
        ];
        args.extend(rest);
        args
    }

    const CREDENTIALS: [&str; 3] = ["id", "secret", "token"];

    #[test]
    fn test_parse_options() {
        let dir = TempDir::new().unwrap();
        let opt = parse_options(&args(dir.path(), CREDENTIALS, &["--at-most", "1"])).unwrap();
        assert_eq!(opt.playlists, dir.path());
        assert!(!opt.prod);
        assert_eq!(opt.at_most, Some(1));
        assert_eq!(opt.repo_dir, PathBuf::from("."));
        assert_eq!(opt.spotify.credentials.client_id, "id");
        assert_eq!(opt.spotify.refresh_token, "token");
        assert_eq!(opt.spotify.user_id, spotify::DEFAULT_USER_ID);

        let opt = parse_options(&args(dir.path(), CREDENTIALS, &["--prod"])).unwrap();
        assert!(opt.prod);
        assert_eq!(opt.at_most, None);
    }

    #[test]
    fn test_parse_empty_credentials() {
        let dir = TempDir::new().unwrap();
        for credentials in [
            ["", "secret", "token"],
            ["id", "", "token"],
            ["id", "secret", ""],
        ] {
            let err = parse_options(&args(dir.path(), credentials, &[])).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation, "{credentials:?}: {err}");
        }
    }

    #[test]
    fn test_parse_missing_refresh_token() {
        let dir = TempDir::new().unwrap();
        let err = parse_options(&[
            "--playlists",
            dir.path().to_str().unwrap(),
            "--client-id",
            "id",
            "--client-secret",
            "secret",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument, "{err}");
    }

    #[test]
    fn test_parse_at_most_in_prod() {
        let dir = TempDir::new().unwrap();
        let err = parse_options(&args(dir.path(), CREDENTIALS, &["--prod", "--at-most", "1"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict, "{err}");
    }

    #[test]
    fn test_parse_missing_playlists_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = parse_options(&args(&missing, CREDENTIALS, &[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation, "{err}");
    }
}
