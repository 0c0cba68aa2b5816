//! Shared mock collaborators for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use freeloop::assets::{
    AssetError, AssetFetch, AssetHit, AssetSearch, AssetSource, AudioDecode, SearchPage,
    SearchQuery,
};
use freeloop::ast::InstanceId;
use freeloop::audio::{OfflineOutput, PlayableBuffer};
use freeloop::config::RuntimeConfig;
use freeloop::feedback::Feedback;
use freeloop::symbol::SoundStatus;
use freeloop::Runtime;

/// Finds one hit for every query except those starting with "silence".
#[derive(Default)]
pub struct MockService {
    pub queries: Mutex<Vec<SearchQuery>>,
}

impl AssetSearch for MockService {
    fn search(&self, query: &SearchQuery) -> Result<SearchPage, AssetError> {
        self.queries.lock().unwrap().push(query.clone());
        if query.text.starts_with("silence") {
            return Ok(SearchPage::default());
        }
        Ok(SearchPage {
            count: 1,
            results: vec![AssetHit {
                id: query.text.clone(),
                name: query.text.clone(),
                preview_urls: vec![format!("mem://{}", query.text)],
                duration: Some(1.0),
            }],
        })
    }
}

impl AssetFetch for MockService {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        Ok(url.as_bytes().to_vec())
    }
}

/// Turns any bytes into a one second mono buffer at 8 kHz.
pub struct MockDecoder;

impl AudioDecode for MockDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PlayableBuffer, AssetError> {
        if bytes.is_empty() {
            return Err(AssetError::Decode("empty".into()));
        }
        Ok(PlayableBuffer::mono(vec![0.25; 8_000], 8_000))
    }
}

pub fn mock_source() -> (Arc<MockService>, AssetSource) {
    let service = Arc::new(MockService::default());
    let source = AssetSource::new(service.clone(), service.clone(), Arc::new(MockDecoder));
    (service, source)
}

#[derive(Default)]
pub struct Recorder {
    pub statuses: Mutex<Vec<(String, SoundStatus)>>,
    pub marks: Mutex<Vec<(InstanceId, f64, f64)>>,
}

impl Recorder {
    pub fn statuses_of(&self, id: &str) -> Vec<SoundStatus> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i == id)
            .map(|(_, s)| *s)
            .collect()
    }
}

impl Feedback for Recorder {
    fn on_status_changed(&self, id: &str, status: SoundStatus) {
        self.statuses.lock().unwrap().push((id.to_string(), status));
    }

    fn on_step_visual_mark(&self, instance: InstanceId, start: f64, end: f64) {
        self.marks.lock().unwrap().push((instance, start, end));
    }
}

pub fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        quantize_launch: false,
        fetch_debounce_ms: 0,
        parse_debounce_ms: 0,
        ..RuntimeConfig::default()
    }
}

pub fn runtime(config: RuntimeConfig) -> (Runtime<OfflineOutput>, Arc<MockService>, Arc<Recorder>) {
    let (service, source) = mock_source();
    let recorder = Arc::new(Recorder::default());
    let rt = Runtime::new(config, OfflineOutput::new())
        .with_source(source)
        .with_feedback(recorder.clone());
    (rt, service, recorder)
}

/// Start every pending search and wait until no worker is left.
pub fn resolve_all(rt: &mut Runtime<OfflineOutput>) {
    let start = Instant::now();
    rt.tick(Instant::now() + Duration::from_secs(1)).unwrap();
    while rt.table().active_tasks() > 0 && start.elapsed() < Duration::from_secs(10) {
        rt.wait_for_resolutions(Duration::from_millis(50));
    }
    rt.wait_for_resolutions(Duration::from_millis(10));
    rt.tick(Instant::now()).unwrap();
}
