//! A Spotify Web API client.

use super::{
    auth,
    error::{
        AddItemsSnafu, ClientError, NewlineInDescriptionSnafu, RequestFailedSnafu,
        RetryBudgetExceededSnafu, UnexpectedResponseSnafu,
    },
    transport::{Body, HttpRequest, HttpResponse, Method, SurfTransport, Transport, TransportError},
    Credentials, Details, Options, Spotify, BASE_URL,
};
use crate::playlist::{PublishedPlaylist, PublishedPlaylistId};
use anyhow::Error;
use async_std::sync::Mutex;
use async_trait::async_trait;
use futures::future::{try_join, try_join_all, BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use strum::Display;

/// The most items Spotify accepts in a single request to add or remove tracks.
const TRACK_BATCH_SIZE: usize = 100;

/// The most playlists to fetch at once, to avoid rate limits.
const PLAYLIST_BATCH_SIZE: usize = 3;

/// Page size when listing playlists.
const PLAYLIST_PAGE_SIZE: usize = 50;

/// Error message for adding a track which doesn't exist.
const NON_EXISTING_ID: &str = "Payload contains a non-existing ID";

/// Prefix of the error message for adding tracks to a full playlist.
const SIZE_LIMIT_REACHED: &str = "Playlist size limit reached";

/// A Spotify Web API client.
///
/// Transient failures are retried transparently. Each retry spends some of a retry budget,
/// shared by every request made through this client; once the budget is exhausted, requests fail
/// with [`ClientError::RetryBudgetExceeded`].
pub struct Client<T = SurfTransport> {
    transport: T,
    credentials: Credentials,
    refresh_token: String,
    user_id: String,
    state: Mutex<State>,
}

struct State {
    access_token: Option<String>,
    retry_budget: Duration,
}

/// What the body of a successful response should look like.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub(super) enum ResponseType {
    Json,
    Empty,
}

/// A failed attempt at a request.
#[derive(Debug)]
pub(super) enum Attempt {
    /// The request should be retried.
    Retry(Retryable),
    /// The request failed for good.
    Fatal(ClientError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Retryable {
    message: String,
    sleep: Duration,
    refresh_access_token: bool,
}

impl Retryable {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sleep: Duration::from_secs(1),
            refresh_access_token: false,
        }
    }
}

impl<T: Transport> Client<T> {
    /// Create a client which talks to Spotify over `transport`.
    pub fn new(transport: T, opt: &Options) -> Self {
        Self {
            transport,
            credentials: opt.credentials.clone(),
            refresh_token: opt.refresh_token.clone(),
            user_id: opt.user_id.clone(),
            state: Mutex::new(State {
                access_token: None,
                retry_budget: opt.retry_budget,
            }),
        }
    }

    /// The transport this client sends requests over.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn get(&self, url: String) -> Result<Value, ClientError> {
        self.request(Method::Get, url, None, ResponseType::Json, true)
            .await
    }

    /// Make a request, retrying transient failures.
    async fn request(
        &self,
        method: Method,
        url: String,
        json: Option<Value>,
        expected: ResponseType,
        raise_if_request_fails: bool,
    ) -> Result<Value, ClientError> {
        loop {
            let access_token = self.access_token().await?;
            let res = self
                .transport
                .send(HttpRequest {
                    method,
                    url: url.clone(),
                    authorization: Some(format!("Bearer {access_token}")),
                    body: json.clone().map(Body::Json).unwrap_or(Body::Empty),
                })
                .await;
            let retry = match coerce_response(res, expected, raise_if_request_fails) {
                Ok(data) => return Ok(data),
                Err(Attempt::Fatal(err)) => return Err(err),
                Err(Attempt::Retry(retry)) => retry,
            };

            {
                let mut state = self.state.lock().await;
                if retry.refresh_access_token {
                    state.access_token = None;
                }
                match state.retry_budget.checked_sub(retry.sleep) {
                    Some(budget) if !budget.is_zero() => state.retry_budget = budget,
                    _ => {
                        state.retry_budget = Duration::ZERO;
                        tracing::error!("{method} {url}: {}, out of retries", retry.message);
                        return RetryBudgetExceededSnafu.fail();
                    }
                }
            }
            tracing::warn!(
                "{}, will retry after {}s",
                retry.message,
                retry.sleep.as_secs()
            );
            self.transport.sleep(retry.sleep).await;
        }
    }

    /// Get the cached access token, or fetch a new one.
    async fn access_token(&self) -> Result<String, ClientError> {
        let mut state = self.state.lock().await;
        if let Some(token) = &state.access_token {
            return Ok(token.clone());
        }
        tracing::info!("getting new access token");
        let token =
            auth::get_user_access_token(&self.transport, &self.credentials, &self.refresh_token)
                .await?;
        tracing::info!("got new access token");
        state.access_token = Some(token.clone());
        Ok(token)
    }

    async fn get_playlist_ids(
        &self,
        at_most: Option<usize>,
    ) -> Result<BTreeSet<PublishedPlaylistId>, ClientError> {
        #[derive(Deserialize)]
        struct Page {
            items: Vec<Item>,
            total: usize,
        }
        #[derive(Deserialize)]
        struct Item {
            id: PublishedPlaylistId,
        }

        let limit = at_most.unwrap_or(PLAYLIST_PAGE_SIZE);
        let mut ids = BTreeSet::new();
        // Just need something nonzero to enter the loop.
        let mut total = 1;
        tracing::info!("getting playlist IDs");
        while ids.len() < at_most.unwrap_or(total) {
            let offset = ids.len();
            let page: Page = parse(
                self.get(format!(
                    "{BASE_URL}/users/{}/playlists?limit={limit}&offset={offset}",
                    self.user_id
                ))
                .await?,
            )?;
            // Total number of public playlists.
            total = page.total;
            ids.extend(page.items.into_iter().map(|item| item.id));
            tracing::info!("got {} / {} playlist IDs", ids.len(), at_most.unwrap_or(total));
            if ids.len() == offset {
                if ids.len() < total {
                    tracing::warn!("playlist listing ended early at {offset} of {total}");
                }
                break;
            }
        }
        Ok(ids)
    }

    async fn get_playlist(
        &self,
        playlist_id: &PublishedPlaylistId,
    ) -> Result<PublishedPlaylist, ClientError> {
        #[derive(Deserialize)]
        struct Playlist {
            name: String,
            description: Option<String>,
        }

        let data: Playlist = parse(
            self.get(format!(
                "{BASE_URL}/playlists/{playlist_id}?fields=name,description"
            ))
            .await?,
        )?;
        tracing::info!("getting playlist content: {}", data.name);
        let track_ids = self.get_track_ids(playlist_id).await?;
        tracing::info!("got playlist content: {}", data.name);
        Ok(PublishedPlaylist {
            playlist_id: playlist_id.clone(),
            name: data.name,
            description: data.description.unwrap_or_default().replace("&#x2F;", "/"),
            track_ids,
        })
    }

    async fn get_track_ids(
        &self,
        playlist_id: &PublishedPlaylistId,
    ) -> Result<BTreeSet<String>, ClientError> {
        #[derive(Deserialize)]
        struct Page {
            items: Vec<Item>,
            next: Option<String>,
        }
        #[derive(Deserialize)]
        struct Item {
            track: Option<Track>,
        }
        #[derive(Deserialize)]
        struct Track {
            id: Option<String>,
        }

        let mut track_ids = BTreeSet::new();
        let mut url = Some(format!(
            "{BASE_URL}/playlists/{playlist_id}/tracks?fields=next,items.track(id)"
        ));
        while let Some(next) = url {
            let page: Page = parse(self.get(next).await?)?;
            // Removed tracks and local files have no ID.
            track_ids.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(|track| track.id)),
            );
            url = page.next;
        }
        Ok(track_ids)
    }

    /// Add a batch of tracks to a playlist.
    ///
    /// If the batch contains an ID Spotify doesn't know about, Spotify rejects the whole batch.
    /// In that case we bisect the batch until we find and skip the bad IDs.
    ///
    /// Returns `false` if the playlist is full, and no more tracks should be added.
    fn add_batch<'a>(
        &'a self,
        playlist_id: &'a PublishedPlaylistId,
        track_ids: &'a [String],
    ) -> BoxFuture<'a, Result<bool, ClientError>> {
        async move {
            let uris = track_ids
                .iter()
                .map(|id| format!("spotify:track:{id}"))
                .collect::<Vec<_>>();
            let data = self
                .request(
                    Method::Post,
                    format!("{BASE_URL}/playlists/{playlist_id}/tracks"),
                    Some(json!({ "uris": uris })),
                    ResponseType::Json,
                    false,
                )
                .await?;
            let Some(error) = data.get("error") else {
                return Ok(true);
            };

            let message = error_message(&data).unwrap_or_default();
            if message == NON_EXISTING_ID {
                match track_ids {
                    [track_id] => {
                        tracing::warn!("skipping bad track ID: {track_id}");
                        Ok(true)
                    }
                    _ => {
                        let (left, right) = track_ids.split_at(track_ids.len() / 2);
                        let (left, right) = try_join(
                            self.add_batch(playlist_id, left),
                            self.add_batch(playlist_id, right),
                        )
                        .await?;
                        Ok(left && right)
                    }
                }
            } else if message.starts_with(SIZE_LIMIT_REACHED) {
                tracing::error!("playlist is too big, aborting: {playlist_id}");
                Ok(false)
            } else {
                AddItemsSnafu {
                    playlist_id: playlist_id.clone(),
                    message: error.to_string(),
                }
                .fail()
            }
        }
        .boxed()
    }
}

#[async_trait]
impl<T: Transport> Spotify for Client<T> {
    async fn get_published_playlists(
        &self,
        at_most: Option<usize>,
    ) -> Result<Vec<PublishedPlaylist>, Error> {
        let ids = self.get_playlist_ids(at_most).await?;
        let ids = ids.into_iter().collect::<Vec<_>>();

        tracing::info!("getting {} playlists", ids.len());
        let mut playlists = Vec::with_capacity(ids.len());
        for (i, batch) in ids.chunks(PLAYLIST_BATCH_SIZE).enumerate() {
            tracing::info!(
                "progress so far: {} / {}",
                i * PLAYLIST_BATCH_SIZE,
                ids.len()
            );
            playlists.extend(try_join_all(batch.iter().map(|id| self.get_playlist(id))).await?);
        }
        Ok(playlists)
    }

    async fn create_playlist(&self, name: &str) -> Result<PublishedPlaylistId, Error> {
        #[derive(Deserialize)]
        struct Created {
            id: PublishedPlaylistId,
        }

        let data = self
            .request(
                Method::Post,
                format!("{BASE_URL}/users/{}/playlists", self.user_id),
                Some(json!({
                    "name": name,
                    "public": true,
                    "collaborative": false,
                })),
                ResponseType::Json,
                true,
            )
            .await?;
        Ok(parse::<Created>(data)?.id)
    }

    async fn unsubscribe_from_playlist(
        &self,
        playlist_id: &PublishedPlaylistId,
    ) -> Result<(), Error> {
        self.request(
            Method::Delete,
            format!("{BASE_URL}/playlists/{playlist_id}/followers"),
            None,
            ResponseType::Empty,
            true,
        )
        .await?;
        Ok(())
    }

    async fn change_playlist_details(
        &self,
        playlist_id: &PublishedPlaylistId,
        details: &Details,
    ) -> Result<(), Error> {
        if let Some(description) = &details.description {
            if description.contains('\n') {
                return Err(NewlineInDescriptionSnafu { description }.build().into());
            }
        }
        self.request(
            Method::Put,
            format!("{BASE_URL}/playlists/{playlist_id}"),
            Some(serde_json::to_value(details)?),
            ResponseType::Empty,
            true,
        )
        .await?;
        Ok(())
    }

    async fn add_items(
        &self,
        playlist_id: &PublishedPlaylistId,
        track_ids: &[String],
    ) -> Result<(), Error> {
        for batch in track_ids.chunks(TRACK_BATCH_SIZE) {
            if !self.add_batch(playlist_id, batch).await? {
                break;
            }
        }
        Ok(())
    }

    async fn remove_items(
        &self,
        playlist_id: &PublishedPlaylistId,
        track_ids: &[String],
    ) -> Result<(), Error> {
        for batch in track_ids.chunks(TRACK_BATCH_SIZE) {
            let tracks = batch
                .iter()
                .map(|id| json!({ "uri": format!("spotify:track:{id}") }))
                .collect::<Vec<_>>();
            self.request(
                Method::Delete,
                format!("{BASE_URL}/playlists/{playlist_id}/tracks"),
                Some(json!({ "tracks": tracks })),
                ResponseType::Json,
                true,
            )
            .await?;
        }
        Ok(())
    }
}

/// Classify the outcome of a single attempt at a request.
///
/// Transient failures are coerced into a uniform [`Retryable`] describing how long to back off
/// before the next attempt.
pub(super) fn coerce_response(
    res: Result<HttpResponse, TransportError>,
    expected: ResponseType,
    raise_if_request_fails: bool,
) -> Result<Value, Attempt> {
    let res = res.map_err(|err| {
        tracing::debug!("{err}");
        Attempt::Retry(Retryable::new("Connection problem"))
    })?;

    match res.status {
        401 => {
            return Err(Attempt::Retry(Retryable {
                refresh_access_token: true,
                ..Retryable::new("Invalid access token")
            }))
        }
        429 => {
            let retry_after = res
                .retry_after
                .as_deref()
                .and_then(|secs| secs.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.)
                .unwrap_or(0.)
                .trunc() as u64;
            return Err(Attempt::Retry(Retryable {
                // Add an extra second, just to be safe.
                sleep: Duration::from_secs(retry_after.saturating_add(1)),
                ..Retryable::new("Rate limited")
            }));
        }
        status if status >= 500 => {
            return Err(Attempt::Retry(Retryable::new(format!(
                "Server error ({status})"
            ))))
        }
        _ => {}
    }

    let data = match expected {
        ResponseType::Json => {
            let data: Value = serde_json::from_str(&res.body).map_err(|_| {
                Attempt::Retry(Retryable::new("Invalid response (invalid JSON)"))
            })?;
            // Sometimes Spotify just returns empty data.
            if is_empty(&data) {
                return Err(Attempt::Retry(Retryable::new(
                    "Invalid response (empty JSON)",
                )));
            }
            data
        }
        ResponseType::Empty => Value::Object(Default::default()),
    };

    if res.status >= 400 && raise_if_request_fails {
        // An empty response may still explain the error.
        let message = error_message(&data)
            .or_else(|| {
                serde_json::from_str::<Value>(&res.body)
                    .ok()
                    .and_then(|body| error_message(&body))
            })
            .unwrap_or_else(|| "unknown error".into());
        return Err(Attempt::Fatal(
            RequestFailedSnafu {
                message,
                status: res.status,
            }
            .build(),
        ));
    }

    Ok(data)
}

fn error_message(data: &Value) -> Option<String> {
    let error = data.get("error")?;
    match error.get("message") {
        Some(Value::String(message)) => Some(message.clone()),
        _ => error.as_str().map(String::from),
    }
}

fn is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T, ClientError> {
    serde_json::from_value(data).map_err(|err| {
        UnexpectedResponseSnafu {
            message: err.to_string(),
        }
        .build()
    })
}
