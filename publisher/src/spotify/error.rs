use crate::playlist::PublishedPlaylistId;
use snafu::Snafu;

/// Errors which propagate out of the Spotify client.
///
/// Transient failures (rate limiting, server errors, expired tokens, connection problems) never
/// show up here; they are retried until the client's retry budget runs out, at which point
/// [`RetryBudgetExceeded`](Self::RetryBudgetExceeded) is reported instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum ClientError {
    /// A request was rejected by Spotify.
    #[snafu(display("{message} ({status})"))]
    RequestFailed { message: String, status: u16 },

    /// Too much time was spent waiting to retry failed requests.
    #[snafu(display("overall retry budget exceeded"))]
    RetryBudgetExceeded,

    /// An access or refresh token could not be obtained.
    #[snafu(display("failed to get token: {message}"))]
    Token { message: String },

    #[snafu(display("newlines in description are not allowed: {description:?}"))]
    NewlineInDescription { description: String },

    #[snafu(display("failed to add tracks to playlist {playlist_id}: {message}"))]
    AddItems {
        playlist_id: PublishedPlaylistId,
        message: String,
    },

    /// A successful response did not have the expected shape.
    #[snafu(display("unexpected response: {message}"))]
    UnexpectedResponse { message: String },
}
