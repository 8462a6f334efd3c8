use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder};

/// Browser identity sent with every request. Some origins reject clients
/// without a recognizable desktop browser user agent.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 6.1; WOW64; rv:43.0) Gecko/20100101 Firefox/43.0";

/// Upper bound for a single request, including reading the body.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the blocking [`Client`] every download goes through.
///
/// Each [`Fetcher`](crate::downloader::Fetcher) calls this once and sends
/// all of its downloads through the returned client, so they share one
/// connection pool. A caller-supplied `builder` keeps its own settings;
/// only the timeout is applied on top.
pub fn build_client(
    builder: Option<ClientBuilder>,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    builder
        .unwrap_or_else(Client::builder)
        .timeout(timeout)
        .build()
}
