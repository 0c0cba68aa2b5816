//! Asset collaborators: search, fetch and decode.
//!
//! The runtime only talks to these traits. [`LocalLibrary`] serves WAV files
//! from a directory; the `remote` feature adds an HTTP search client.

pub mod library;
#[cfg(feature = "remote")]
pub mod remote;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::audio::PlayableBuffer;

pub use library::LocalLibrary;
#[cfg(feature = "remote")]
pub use remote::RemoteClient;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("search failed: {0}")]
    Search(String),
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A search request built from a sound literal and its query parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchQuery {
    /// Free text: the keyword plus any tags.
    pub text: String,
    pub tags: Vec<String>,
    /// Upper bound on clip duration in seconds.
    pub max_duration: Option<f64>,
    /// Target pitch in Hz.
    pub pitch: Option<f64>,
    /// Extra service-specific filters from configuration.
    pub filters: BTreeMap<String, String>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl SearchQuery {
    pub fn with_page(&self, page: usize) -> SearchQuery {
        SearchQuery {
            page,
            ..self.clone()
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetHit {
    pub id: String,
    pub name: String,
    pub preview_urls: Vec<String>,
    pub duration: Option<f64>,
}

/// One page of search results plus the total match count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    pub count: usize,
    pub results: Vec<AssetHit>,
}

pub trait AssetSearch: Send + Sync {
    fn search(&self, query: &SearchQuery) -> Result<SearchPage, AssetError>;
}

pub trait AssetFetch: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

pub trait AudioDecode: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PlayableBuffer, AssetError>;
}

/// The three collaborators bundled for background resolution.
#[derive(Clone)]
pub struct AssetSource {
    pub search: Arc<dyn AssetSearch>,
    pub fetch: Arc<dyn AssetFetch>,
    pub decode: Arc<dyn AudioDecode>,
}

impl AssetSource {
    pub fn new(
        search: Arc<dyn AssetSearch>,
        fetch: Arc<dyn AssetFetch>,
        decode: Arc<dyn AudioDecode>,
    ) -> Self {
        Self {
            search,
            fetch,
            decode,
        }
    }

    /// A local sample directory, decoded as WAV.
    pub fn local(library: LocalLibrary) -> Self {
        let library = Arc::new(library);
        Self {
            search: library.clone(),
            fetch: library,
            decode: Arc::new(crate::audio::WavDecoder),
        }
    }
}

impl std::fmt::Debug for AssetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetSource").finish_non_exhaustive()
    }
}
