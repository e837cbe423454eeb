//! Interactive login to obtain a refresh token for the publishing user.

use crate::spotify::{auth, parse_seconds, Credentials, SurfTransport};
use anyhow::Error;
use async_std::channel::{self, Sender};
use clap::Args;
use futures::{future::FutureExt, pin_mut, select};
use serde::Deserialize;
use std::process::Command;
use std::time::Duration;
use tide::{Request, Response};

/// Options for the `login` command.
#[derive(Args, Clone, Debug)]
pub struct Options {
    #[clap(flatten)]
    pub credentials: Credentials,

    /// Port for the local server which receives the authorization callback.
    #[clap(short, long, env = "PUBLISHER_LOGIN_PORT", default_value = "8000")]
    pub port: u16,

    /// Timeout, in seconds, for the token request.
    #[clap(
        long,
        env = "SPOTIFY_TIMEOUT",
        default_value = "30",
        value_parser = parse_seconds,
        value_name = "SECONDS"
    )]
    pub timeout: Duration,
}

/// Log in as the publishing user and print a refresh token for them.
pub async fn login(opt: Options) -> Result<(), Error> {
    let redirect_uri = format!("http://localhost:{}", opt.port);
    let url = auth::authorize_url(&opt.credentials.client_id, &redirect_uri);
    println!("Log in to Spotify by visiting:\n\n    {url}\n");
    match Command::new("xdg-open").arg(url.as_str()).status() {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!("unable to open browser: xdg-open exited with {status}"),
        Err(err) => tracing::warn!("unable to open browser: {err}"),
    }

    let code = receive_authorization_code("localhost", opt.port).await?;
    tracing::info!("received authorization code");

    let transport = SurfTransport::new(opt.timeout)?;
    let refresh_token =
        auth::get_user_refresh_token(&transport, &opt.credentials, &code, &redirect_uri).await?;
    println!("Refresh token (set SPOTIFY_REFRESH_TOKEN to this value):\n\n    {refresh_token}");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Callback {
    code: Option<String>,
    error: Option<String>,
}

type CallbackResult = Result<String, String>;

/// Serve the redirect target of the authorization flow until Spotify calls back with a code.
pub async fn receive_authorization_code(host: &str, port: u16) -> Result<String, Error> {
    let (sender, receiver) = channel::unbounded();
    let mut app = tide::with_state(sender);
    app.at("/").get(callback);

    let server = app.listen(format!("{host}:{port}")).fuse();
    let code = receiver.recv().fuse();
    pin_mut!(server, code);
    select! {
        res = server => {
            res?;
            Err(Error::msg("callback server exited before receiving a code"))
        }
        res = code => match res {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(err)) => Err(Error::msg(format!("authorization failed: {err}"))),
            Err(_) => Err(Error::msg("callback server exited before receiving a code")),
        },
    }
}

async fn callback(req: Request<Sender<CallbackResult>>) -> tide::Result {
    let query: Callback = req.query()?;
    let (res, status, body) = match query {
        Callback {
            code: Some(code), ..
        } if !code.is_empty() => (Ok(code), 200, "OK!"),
        Callback {
            error: Some(error), ..
        } => (Err(error), 400, "Authorization failed"),
        _ => {
            tracing::warn!("callback without an authorization code");
            return Ok(Response::builder(400)
                .body("Missing authorization code")
                .build());
        }
    };
    // The receiver is gone only if a code has already been received.
    req.state().send(res).await.ok();
    Ok(Response::builder(status).body(body).build())
}

#[cfg(test)]
mod test {
    use super::*;
    use async_std::task::{sleep, spawn};
    use portpicker::pick_unused_port;

    async fn get(port: u16, query: &str) -> (u16, String) {
        const MAX_CONNECT_RETRIES: usize = 60;

        let url = format!("http://127.0.0.1:{port}/{query}");
        for _ in 0..MAX_CONNECT_RETRIES {
            match surf::get(&url).await {
                Ok(mut res) => {
                    let body = res.body_string().await.unwrap();
                    return (res.status().into(), body);
                }
                Err(err) => {
                    tracing::warn!("waiting for server to start: {err}");
                    sleep(Duration::from_millis(100)).await;
                }
            }
        }
        panic!("timed out waiting for server");
    }

    #[async_std::test]
    async fn test_receive_code() {
        let port = pick_unused_port().unwrap();
        let server = spawn(receive_authorization_code("127.0.0.1", port));

        // Requests without a code are rejected, and the server keeps waiting.
        let (status, body) = get(port, "").await;
        assert_eq!(status, 400);
        assert_eq!(body, "Missing authorization code");
        let (status, _) = get(port, "?code=").await;
        assert_eq!(status, 400);

        let (status, body) = get(port, "?code=abc").await;
        assert_eq!(status, 200);
        assert_eq!(body, "OK!");
        assert_eq!(server.await.unwrap(), "abc");
    }

    #[async_std::test]
    async fn test_access_denied() {
        let port = pick_unused_port().unwrap();
        let server = spawn(receive_authorization_code("127.0.0.1", port));

        let (status, _) = get(port, "?error=access_denied").await;
        assert_eq!(status, 400);
        let err = server.await.unwrap_err();
        assert!(err.to_string().contains("access_denied"), "{err}");
    }
}
