//! HTTP-backed schema cache

use std::time::Duration;

use jsongen_core::{Cache, CacheError};

/// Fetches schema documents over HTTP(S), remembering nothing between
/// calls; the resolver's own store deduplicates fetches.
pub struct HttpCache {
    client: reqwest::blocking::Client,
}

impl HttpCache {
    pub fn new() -> Result<Self, CacheError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl Cache for HttpCache {
    fn resolve(&self, url: &str) -> Result<Vec<u8>, CacheError> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}
