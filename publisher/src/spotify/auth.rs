//! Spotify authorization.
//!
//! Publishing uses the OAuth authorization code flow. The `login` command runs the flow once,
//! interactively, to obtain a long-lived refresh token; every publish then exchanges that refresh
//! token for a short-lived access token.

use super::{
    error::{ClientError, TokenSnafu},
    transport::{Body, HttpRequest, Method, Transport},
    Credentials,
};
use base64::prelude::*;
use serde_json::Value;
use surf::Url;

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Permissions requested from the publishing user.
pub const SCOPE: &str = "playlist-modify-public";

/// The URL where a user grants us access to their account.
pub fn authorize_url(client_id: &str, redirect_uri: &str) -> Url {
    let mut url = Url::parse(AUTHORIZE_URL).expect("AUTHORIZE_URL is a valid URL");
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPE);
    url
}

/// Exchange an authorization code from the login flow for a refresh token.
pub async fn get_user_refresh_token(
    transport: &impl Transport,
    credentials: &Credentials,
    authorization_code: &str,
    redirect_uri: &str,
) -> Result<String, ClientError> {
    request_token(
        transport,
        credentials,
        vec![
            ("grant_type".into(), "authorization_code".into()),
            ("code".into(), authorization_code.into()),
            ("redirect_uri".into(), redirect_uri.into()),
        ],
        "refresh_token",
    )
    .await
}

/// Exchange a refresh token for a new access token.
pub async fn get_user_access_token(
    transport: &impl Transport,
    credentials: &Credentials,
    refresh_token: &str,
) -> Result<String, ClientError> {
    request_token(
        transport,
        credentials,
        vec![
            ("grant_type".into(), "refresh_token".into()),
            ("refresh_token".into(), refresh_token.into()),
        ],
        "access_token",
    )
    .await
}

async fn request_token(
    transport: &impl Transport,
    credentials: &Credentials,
    form: Vec<(String, String)>,
    field: &str,
) -> Result<String, ClientError> {
    let res = transport
        .send(HttpRequest {
            method: Method::Post,
            url: TOKEN_URL.into(),
            authorization: Some(basic_auth(credentials)),
            body: Body::Form(form),
        })
        .await
        .map_err(|err| TokenSnafu { message: err.to_string() }.build())?;
    let data: Value = serde_json::from_str(&res.body).map_err(|err| {
        TokenSnafu {
            message: format!("invalid response ({}): {err}", res.status),
        }
        .build()
    })?;

    if let Some(error) = data.get("error") {
        return TokenSnafu {
            message: error.to_string(),
        }
        .fail();
    }
    let token = match data.get(field).and_then(Value::as_str) {
        Some(token) if !token.is_empty() => token,
        _ => {
            return TokenSnafu {
                message: format!("invalid {field}: {}", data.get(field).unwrap_or(&Value::Null)),
            }
            .fail()
        }
    };
    match data.get("token_type").and_then(Value::as_str) {
        Some("Bearer") => Ok(token.into()),
        token_type => TokenSnafu {
            message: format!("invalid token type: {token_type:?}"),
        }
        .fail(),
    }
}

fn basic_auth(credentials: &Credentials) -> String {
    let encoded = BASE64_STANDARD.encode(format!(
        "{}:{}",
        credentials.client_id, credentials.client_secret
    ));
    format!("Basic {encoded}")
}
