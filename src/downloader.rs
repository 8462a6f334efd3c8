use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use log::{debug, trace};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::StatusCode;

use crate::http::{self, READ_TIMEOUT};

/// Header name used by [`Downloader::download_with_language`].
pub const ACCEPT_LANGUAGE: &str = "Accept-Language";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The origin answered 429 and expects an interactive verification
    /// before serving more content.
    #[error("reCaptcha challenge requested by {url}")]
    ChallengeRequired { url: String },
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

/// Text download contract used by content extractors.
///
/// `Ok(None)` means the origin answered successfully without a body.
pub trait Downloader {
    fn download_with_headers(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Option<String>, DownloadError>;

    fn download(&self, url: &str) -> Result<Option<String>, DownloadError> {
        self.download_with_headers(url, &HashMap::new())
    }

    /// Download `url` with `Accept-Language` set to `language`.
    fn download_with_language(
        &self,
        url: &str,
        language: &str,
    ) -> Result<Option<String>, DownloadError> {
        let headers = HashMap::from([(ACCEPT_LANGUAGE.to_string(), language.to_string())]);
        self.download_with_headers(url, &headers)
    }
}

#[derive(Debug)]
pub struct FetcherConfig {
    read_timeout: Duration,
    transport: Option<ClientBuilder>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            transport: None,
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Start from a caller-configured client builder (proxies, TLS roots,
    /// redirect policy...). The read timeout is still applied on top.
    pub fn with_transport(mut self, builder: ClientBuilder) -> Self {
        self.transport = Some(builder);
        self
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

/// Blocking [`Downloader`] backed by one pooled `reqwest` client.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    cookies: RwLock<String>,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, DownloadError> {
        let FetcherConfig {
            read_timeout,
            transport,
        } = config;
        let client = http::build_client(transport, read_timeout)?;
        debug!("built HTTP client with a {read_timeout:?} timeout");
        Ok(Self {
            client,
            cookies: RwLock::default(),
        })
    }

    pub fn cookies(&self) -> String {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_cookies(&self, cookies: impl Into<String>) {
        *self.cookies.write().unwrap_or_else(PoisonError::into_inner) = cookies.into();
    }
}

impl Downloader for Fetcher {
    fn download_with_headers(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Option<String>, DownloadError> {
        // Caller headers are appended, so a caller User-Agent becomes a
        // second value next to the default one.
        let mut request = self.client.get(url).header(USER_AGENT, http::USER_AGENT);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let cookies = self.cookies();
        let with_cookie = !cookies.is_empty();
        if with_cookie {
            request = request.header(COOKIE, cookies);
        }

        debug!(
            "GET {url} ({} custom headers, cookie attached: {with_cookie})",
            headers.len()
        );
        let response = request.send()?;
        let status = response.status();
        trace!("got {status} response from {url}");

        // The challenge page body is left unread.
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DownloadError::ChallengeRequired {
                url: url.to_string(),
            });
        }

        if is_bodiless(status) {
            debug!("{url} answered {status} without a body");
            return Ok(None);
        }

        // An empty body is no content however it was framed.
        let text = response.text()?;
        if text.is_empty() {
            debug!("{url} answered {status} with an empty body");
            return Ok(None);
        }
        Ok(Some(text))
    }
}

fn is_bodiless(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Arc;
    use std::thread;

    struct RecordingDownloader {
        calls: RefCell<Vec<(String, HashMap<String, String>)>>,
    }

    impl RecordingDownloader {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Downloader for RecordingDownloader {
        fn download_with_headers(
            &self,
            url: &str,
            headers: &HashMap<String, String>,
        ) -> Result<Option<String>, DownloadError> {
            self.calls
                .borrow_mut()
                .push((url.to_string(), headers.clone()));
            Ok(Some("ok".to_string()))
        }
    }

    #[test]
    fn language_download_sets_accept_language_header() {
        let recorder = RecordingDownloader::new();

        recorder
            .download_with_language("https://example.com", "de")
            .unwrap();
        recorder
            .download_with_headers(
                "https://example.com",
                &HashMap::from([("Accept-Language".to_string(), "de".to_string())]),
            )
            .unwrap();

        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[test]
    fn plain_download_sends_no_custom_headers() {
        let recorder = RecordingDownloader::new();

        let body = recorder.download("https://example.com/page").unwrap();

        assert_eq!(body.as_deref(), Some("ok"));
        let calls = recorder.calls.borrow();
        assert_eq!(calls[0].0, "https://example.com/page");
        assert!(calls[0].1.is_empty());
    }

    #[test]
    fn cookies_start_empty_and_last_write_wins() {
        let fetcher = Fetcher::new(FetcherConfig::new()).unwrap();
        assert_eq!(fetcher.cookies(), "");

        fetcher.set_cookies("x=1");
        assert_eq!(fetcher.cookies(), "x=1");

        fetcher.set_cookies(String::from("y=2; z=3"));
        assert_eq!(fetcher.cookies(), "y=2; z=3");
    }

    #[test]
    fn cookies_written_on_one_thread_are_visible_on_another() {
        let fetcher = Arc::new(Fetcher::new(FetcherConfig::new()).unwrap());

        let writer = Arc::clone(&fetcher);
        thread::spawn(move || writer.set_cookies("sid=abc123"))
            .join()
            .unwrap();

        assert_eq!(fetcher.cookies(), "sid=abc123");
    }

    #[test]
    fn config_defaults_to_thirty_second_timeout() {
        let config = FetcherConfig::new();
        assert_eq!(config.read_timeout(), Duration::from_secs(30));

        let config = config.with_read_timeout(Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
    }
}
