//! Background sound resolution: search, pick, fetch, decode.
//!
//! Each sound entry gets its own worker thread with a cancellation flag.
//! Workers never touch the table; they report [`ResolutionUpdate`]s over a
//! channel that the table drains on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::assets::{AssetError, AssetHit, AssetSource, SearchQuery};
use crate::audio::PlayableBuffer;

/// How results are chosen among the matches of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: 15,
            max_pages: 5,
        }
    }
}

/// A progress report from a worker, tagged with the task serial so reports
/// from a cancelled task can be told apart from its replacement's.
#[derive(Debug)]
pub(crate) struct ResolutionUpdate {
    pub(crate) id: String,
    pub(crate) serial: u64,
    pub(crate) event: ResolutionEvent,
}

#[derive(Debug)]
pub(crate) enum ResolutionEvent {
    Downloading(AssetHit),
    Available(Arc<PlayableBuffer>),
    Unavailable(String),
}

/// A running resolution. Dropping it does not stop the worker; call
/// [`ResolutionTask::cancel`].
#[derive(Debug)]
pub(crate) struct ResolutionTask {
    pub(crate) serial: u64,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ResolutionTask {
    pub(crate) fn spawn(
        id: String,
        query: SearchQuery,
        source: AssetSource,
        paging: Paging,
        seed: u64,
        serial: u64,
        tx: Sender<ResolutionUpdate>,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let thread = thread::Builder::new()
            .name(format!("resolve {id}"))
            .spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let report = |event| ResolutionUpdate {
                    id: id.clone(),
                    serial,
                    event,
                };
                let event = match resolve(&query, &source, paging, &mut rng, &flag, |hit| {
                    let _ = tx.send(report(ResolutionEvent::Downloading(hit)));
                }) {
                    Ok(Some(buffer)) => ResolutionEvent::Available(Arc::new(buffer)),
                    Ok(None) => return,
                    Err(e) => {
                        debug!(sound = %id, error = %e, "resolution failed");
                        ResolutionEvent::Unavailable(e.to_string())
                    }
                };
                if !flag.load(Ordering::Relaxed) {
                    let _ = tx.send(report(event));
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to spawn resolution thread");
                None
            }
        };
        Self {
            serial,
            cancel,
            thread,
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.thread.take();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }
}

/// Run the pipeline. `Ok(None)` means the task was cancelled.
fn resolve(
    query: &SearchQuery,
    source: &AssetSource,
    paging: Paging,
    rng: &mut ChaCha8Rng,
    cancel: &AtomicBool,
    on_download: impl FnOnce(AssetHit),
) -> Result<Option<PlayableBuffer>, AssetError> {
    let first = source.search.search(&query.with_page(1))?;
    if cancel.load(Ordering::Relaxed) {
        return Ok(None);
    }
    if first.count == 0 || first.results.is_empty() {
        return Err(AssetError::Search(format!("no results for \"{}\"", query.text)));
    }

    let page_size = paging.page_size.max(1);
    let mut results = first.results;
    if first.count > page_size && paging.max_pages > 1 {
        let pages = first.count.div_ceil(page_size).min(paging.max_pages);
        let page = rng.gen_range(1..=pages);
        if page > 1 {
            match source.search.search(&query.with_page(page)) {
                Ok(other) if !other.results.is_empty() => results = other.results,
                Ok(_) => {}
                Err(e) => debug!(page, error = %e, "page fetch failed, using first page"),
            }
            if cancel.load(Ordering::Relaxed) {
                return Ok(None);
            }
        }
    }

    let hit = results.swap_remove(rng.gen_range(0..results.len()));
    let url = hit
        .preview_urls
        .first()
        .cloned()
        .ok_or_else(|| AssetError::Search(format!("result {} has no preview", hit.id)))?;

    on_download(hit);

    let bytes = source.fetch.fetch(&url)?;
    if cancel.load(Ordering::Relaxed) {
        return Ok(None);
    }
    let buffer = source.decode.decode(&bytes)?;
    Ok(Some(buffer))
}
