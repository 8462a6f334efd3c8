//! Process-wide [`Fetcher`] for callers that cannot thread one through.
//!
//! Prefer building a [`Fetcher`] once and passing it as `&dyn Downloader`.
//! This module exists for extractors that expect a globally reachable
//! downloader. [`init`] is meant to be called exactly once, early in the
//! process; calling it again replaces the installed instance.

use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::downloader::{DownloadError, Fetcher, FetcherConfig};

static INSTANCE: RwLock<Option<Arc<Fetcher>>> = RwLock::new(None);

/// Build a [`Fetcher`] from `config`, install it and return it.
pub fn init(config: FetcherConfig) -> Result<Arc<Fetcher>, DownloadError> {
    let fetcher = Arc::new(Fetcher::new(config)?);
    let previous = INSTANCE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(Arc::clone(&fetcher));
    if previous.is_some() {
        debug!("replaced the process-wide fetcher");
    }
    Ok(fetcher)
}

/// The installed [`Fetcher`], or `None` before [`init`] ran.
pub fn instance() -> Option<Arc<Fetcher>> {
    INSTANCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
