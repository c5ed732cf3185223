//! Acquiring clip bytes by URL.
//!
//! Fetching sits behind [`SourceFetcher`] so the engine runs the same way
//! over HTTP, inside a browser host, or in tests with an in-memory map.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::{EngineError, Result};

/// Future returned by [`SourceFetcher::fetch`]. Not `Send`: the engine is
/// single-threaded and browser fetch futures are not `Send` either.
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + 'a>>;

pub trait SourceFetcher {
    /// Fetch the whole body at `url`. Non-success responses are
    /// [`EngineError::Load`] errors naming the URL.
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Serves bytes registered ahead of time. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    sources: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.sources.insert(url.into(), bytes);
    }

    pub fn with_source(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }
}

impl SourceFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            self.sources
                .get(url)
                .cloned()
                .ok_or_else(|| EngineError::load(url, "HTTP 404 Not Found"))
        })
    }
}

/// Fetches over HTTP(S) with reqwest.
#[cfg(feature = "remote")]
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "remote")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpFetcher { client }
    }
}

#[cfg(feature = "remote")]
impl SourceFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            log::debug!("fetching {url}");
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| EngineError::load(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(EngineError::load(url, format!("HTTP {status}")));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| EngineError::load(url, e))?;
            Ok(bytes.to_vec())
        })
    }
}

/// The fetcher an engine gets when none is supplied.
pub fn default_fetcher() -> Box<dyn SourceFetcher> {
    #[cfg(feature = "remote")]
    {
        Box::new(HttpFetcher::new())
    }
    #[cfg(not(feature = "remote"))]
    {
        Box::new(MemoryFetcher::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_fetcher_serves_registered_bytes() {
        let fetcher = MemoryFetcher::new().with_source("mem://a.wav", vec![1, 2, 3]);
        assert_eq!(fetcher.fetch("mem://a.wav").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unknown_url_is_a_load_error_naming_it() {
        let fetcher = MemoryFetcher::new();
        let err = fetcher.fetch("mem://missing.wav").await.unwrap_err();
        match err {
            EngineError::Load { origin, reason } => {
                assert_eq!(origin, "mem://missing.wav");
                assert!(reason.contains("404"));
            }
            other => panic!("expected Load, got {other:?}"),
        }
    }
}
