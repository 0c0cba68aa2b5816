//! HTTP search and fetch against a Freesound-style JSON API.
//!
//! `GET {api_url}/search/text/?query=..&page=..&page_size=..` is expected to
//! return `{"count": n, "results": [{"id", "name", "duration", "previews":
//! {kind: url}}]}`. Preview bytes go through the configured decoder, so the
//! service has to offer WAV previews.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{AssetError, AssetFetch, AssetHit, AssetSearch, SearchPage, SearchQuery};

const TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct SearchResponse {
    count: usize,
    #[serde(default)]
    results: Vec<RemoteSound>,
}

#[derive(Debug, Deserialize)]
struct RemoteSound {
    id: serde_json::Value,
    #[serde(default)]
    name: String,
    duration: Option<f64>,
    #[serde(default)]
    previews: BTreeMap<String, String>,
}

impl RemoteSound {
    fn into_hit(self) -> AssetHit {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        // WAV previews first, then the rest in key order.
        let (mut urls, rest): (Vec<_>, Vec<_>) = self
            .previews
            .into_iter()
            .partition(|(kind, url)| kind.contains("wav") || url.ends_with(".wav"));
        urls.extend(rest);
        AssetHit {
            id,
            name: self.name,
            preview_urls: urls.into_iter().map(|(_, url)| url).collect(),
            duration: self.duration,
        }
    }
}

/// Blocking HTTP client. Runs on resolution worker threads only.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    api_url: String,
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

impl RemoteClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Result<Self, AssetError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .build()
            .map_err(|e| AssetError::Search(e.to_string()))?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    fn params(&self, query: &SearchQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("query".to_string(), query.text.clone()),
            ("page".to_string(), query.page.max(1).to_string()),
            ("page_size".to_string(), query.page_size.max(1).to_string()),
            ("fields".to_string(), "id,name,duration,previews".to_string()),
        ];
        let mut filters: Vec<String> = query
            .filters
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect();
        if let Some(max) = query.max_duration {
            filters.push(format!("duration:[0 TO {max}]"));
        }
        if !filters.is_empty() {
            params.push(("filter".to_string(), filters.join(" ")));
        }
        if let Some(pitch) = query.pitch {
            params.push(("target".to_string(), format!("pitch:{pitch}")));
        }
        if let Some(key) = &self.api_key {
            params.push(("token".to_string(), key.clone()));
        }
        params
    }
}

impl AssetSearch for RemoteClient {
    fn search(&self, query: &SearchQuery) -> Result<SearchPage, AssetError> {
        let url = format!("{}/search/text/", self.api_url);
        debug!(query = %query.text, page = query.page, "remote search");
        let response: SearchResponse = self
            .http
            .get(&url)
            .query(&self.params(query))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| AssetError::Search(e.to_string()))?;
        Ok(SearchPage {
            count: response.count,
            results: response
                .results
                .into_iter()
                .map(RemoteSound::into_hit)
                .filter(|h| !h.preview_urls.is_empty())
                .collect(),
        })
    }
}

impl AssetFetch for RemoteClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let fail = |e: reqwest::Error| AssetError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Token {key}"));
        }
        let bytes = request
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(fail)?;
        Ok(bytes.to_vec())
    }
}
