//! Blocking text downloads for content extractors.
//!
//! A [`Fetcher`] sends GET requests with a fixed browser user agent,
//! optional extra headers and a session cookie, and reports HTTP 429 as
//! [`DownloadError::ChallengeRequired`].

pub mod config;
pub mod downloader;
pub mod global;
pub mod http;

pub use downloader::{DownloadError, Downloader, Fetcher, FetcherConfig};
