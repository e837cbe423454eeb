use clap::Parser;
use publisher::{init_logging, login, publish};

/// Publish the cumulative playlist archive to Spotify.
#[derive(Parser)]
enum Command {
    /// Bring the published Spotify playlists in line with the scraped archive.
    Publish(publish::Options),
    /// Log in to Spotify and print a refresh token for the publishing account.
    Login(login::Options),
}

#[async_std::main]
async fn main() -> Result<(), anyhow::Error> {
    init_logging();

    match Command::parse() {
        Command::Publish(opt) => publish::publish(&opt).await,
        Command::Login(opt) => login::login(opt).await,
    }
}
