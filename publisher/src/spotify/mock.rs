//! In-memory stand-ins for Spotify.
//!
//! [`MockTransport`] replays scripted HTTP responses, for testing the client itself.
//! [`MockSpotify`] implements the high-level [`Spotify`] interface, for testing code built on top
//! of the client without speaking HTTP at all.
#![cfg(any(test, feature = "testing"))]

use super::{
    auth::TOKEN_URL,
    transport::{HttpRequest, HttpResponse, Transport, TransportError},
    Details, Spotify,
};
use crate::playlist::{PublishedPlaylist, PublishedPlaylistId};
use anyhow::Error;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// A [`Transport`] which replays scripted responses and records requests.
///
/// Requests get the scripted responses in order; once the script runs out, every request fails
/// with a `500` status.
#[derive(Debug, Default)]
pub struct MockTransport {
    issue_tokens: bool,
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
    sleeps: Mutex<Vec<Duration>>,
    tokens: Mutex<usize>,
}

impl MockTransport {
    /// A transport which answers requests to the token endpoint with a fresh access token,
    /// without consuming scripted responses or recording the request.
    pub fn issuing_tokens() -> Self {
        Self {
            issue_tokens: true,
            ..Default::default()
        }
    }

    /// Queue a response with the given status and body.
    pub fn respond(&self, status: u16, body: impl Into<String>) {
        self.push(Ok(HttpResponse {
            status,
            retry_after: None,
            body: body.into(),
        }));
    }

    /// Queue a `429` response with the given `Retry-After` header.
    pub fn rate_limit(&self, retry_after: impl Into<String>) {
        self.push(Ok(HttpResponse {
            status: 429,
            retry_after: Some(retry_after.into()),
            body: String::new(),
        }));
    }

    /// Queue a failure to get any response.
    pub fn disconnect(&self) {
        self.push(Err("connection reset by peer".into()));
    }

    /// All requests sent so far, except automatically answered token requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// All the times the client has backed off.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// The number of access tokens handed out.
    pub fn tokens_issued(&self) -> usize {
        *self.tokens.lock().unwrap()
    }

    fn push(&self, res: Result<HttpResponse, String>) {
        self.responses.lock().unwrap().push_back(res);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        if self.issue_tokens && req.url == TOKEN_URL {
            let mut tokens = self.tokens.lock().unwrap();
            *tokens += 1;
            return Ok(HttpResponse {
                status: 200,
                retry_after: None,
                body: format!(
                    r#"{{"access_token": "token{}", "token_type": "Bearer"}}"#,
                    *tokens
                ),
            });
        }

        self.requests.lock().unwrap().push(req);
        match self.responses.lock().unwrap().pop_front() {
            Some(res) => res.map_err(TransportError::from),
            None => Ok(HttpResponse {
                status: 500,
                ..Default::default()
            }),
        }
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// A call made to [`MockSpotify`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    CreatePlaylist(String),
    UnsubscribeFromPlaylist(PublishedPlaylistId),
    ChangePlaylistDetails(PublishedPlaylistId, Details),
    AddItems(PublishedPlaylistId, Vec<String>),
    RemoveItems(PublishedPlaylistId, Vec<String>),
}

/// An in-memory [`Spotify`] account which records every change made to it.
#[derive(Debug, Default)]
pub struct MockSpotify {
    playlists: Vec<PublishedPlaylist>,
    created: HashMap<String, PublishedPlaylistId>,
    calls: Mutex<Vec<Call>>,
    fetches: Mutex<Vec<Option<usize>>>,
}

impl MockSpotify {
    /// An account which owns `playlists`.
    pub fn new(playlists: impl IntoIterator<Item = PublishedPlaylist>) -> Self {
        Self {
            playlists: playlists.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Assign `id` to the playlist that will be created with `name`.
    pub fn with_created(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.created
            .insert(name.into(), PublishedPlaylistId::new(id.into()));
        self
    }

    /// Every change made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// The `at_most` argument of every call to
    /// [`get_published_playlists`](Spotify::get_published_playlists).
    pub fn fetches(&self) -> Vec<Option<usize>> {
        self.fetches.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Spotify for MockSpotify {
    async fn get_published_playlists(
        &self,
        at_most: Option<usize>,
    ) -> Result<Vec<PublishedPlaylist>, Error> {
        self.fetches.lock().unwrap().push(at_most);
        let n = at_most.unwrap_or(self.playlists.len());
        Ok(self.playlists.iter().take(n).cloned().collect())
    }

    async fn create_playlist(&self, name: &str) -> Result<PublishedPlaylistId, Error> {
        self.record(Call::CreatePlaylist(name.into()));
        self.created
            .get(name)
            .cloned()
            .ok_or_else(|| Error::msg(format!("unexpected playlist {name}")))
    }

    async fn unsubscribe_from_playlist(
        &self,
        playlist_id: &PublishedPlaylistId,
    ) -> Result<(), Error> {
        self.record(Call::UnsubscribeFromPlaylist(playlist_id.clone()));
        Ok(())
    }

    async fn change_playlist_details(
        &self,
        playlist_id: &PublishedPlaylistId,
        details: &Details,
    ) -> Result<(), Error> {
        self.record(Call::ChangePlaylistDetails(
            playlist_id.clone(),
            details.clone(),
        ));
        Ok(())
    }

    async fn add_items(
        &self,
        playlist_id: &PublishedPlaylistId,
        track_ids: &[String],
    ) -> Result<(), Error> {
        self.record(Call::AddItems(playlist_id.clone(), track_ids.to_vec()));
        Ok(())
    }

    async fn remove_items(
        &self,
        playlist_id: &PublishedPlaylistId,
        track_ids: &[String],
    ) -> Result<(), Error> {
        self.record(Call::RemoveItems(playlist_id.clone(), track_ids.to_vec()));
        Ok(())
    }
}
