//! A local directory of WAV files acting as the search and fetch service.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{AssetError, AssetFetch, AssetHit, AssetSearch, SearchPage, SearchQuery};

const FILE_SCHEME: &str = "file://";

#[derive(Debug, Clone)]
struct LibraryFile {
    path: PathBuf,
    /// Relative path, used as the hit id.
    id: String,
    /// Lowercase words of the relative path.
    words: Vec<String>,
    duration: Option<f64>,
}

/// WAV files under a directory, found by the words of their path.
///
/// `kick` matches `drums/kick_808.wav` and `kicks/hard.wav`; every word of the
/// query must prefix some word of the path.
#[derive(Debug, Clone)]
pub struct LocalLibrary {
    root: PathBuf,
    files: Vec<LibraryFile>,
}

impl LocalLibrary {
    /// Scan `root` recursively. Unreadable entries are skipped.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AssetError> {
        let root = root.into();
        let mut files = Vec::new();
        scan(&root, &root, &mut files)?;
        files.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(root = %root.display(), files = files.len(), "sample library scanned");
        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn matches(file: &LibraryFile, words: &[String], query: &SearchQuery) -> bool {
        let named = words
            .iter()
            .all(|w| file.words.iter().any(|fw| fw.starts_with(w.as_str())));
        let short_enough = match (query.max_duration, file.duration) {
            (Some(max), Some(d)) => d <= max,
            _ => true,
        };
        named && short_enough
    }
}

fn scan(root: &Path, dir: &Path, out: &mut Vec<LibraryFile>) -> Result<(), AssetError> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            if let Err(e) = scan(root, &path, out) {
                warn!(dir = %path.display(), error = %e, "skipping directory");
            }
            continue;
        }
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if !is_wav {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path.as_path()).with_extension("");
        let id = relative.to_string_lossy().replace('\\', "/");
        let words = split_words(&id);
        let duration = hound::WavReader::open(&path)
            .ok()
            .map(|r| r.duration() as f64 / r.spec().sample_rate.max(1) as f64);
        out.push(LibraryFile {
            path,
            id,
            words,
            duration,
        });
    }
    Ok(())
}

fn split_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl AssetSearch for LocalLibrary {
    fn search(&self, query: &SearchQuery) -> Result<SearchPage, AssetError> {
        let words = split_words(&query.text);
        let matches: Vec<&LibraryFile> = self
            .files
            .iter()
            .filter(|f| Self::matches(f, &words, query))
            .collect();

        let page_size = query.page_size.max(1);
        let skip = query.page.max(1).saturating_sub(1) * page_size;
        let results = matches
            .iter()
            .skip(skip)
            .take(page_size)
            .map(|f| AssetHit {
                id: f.id.clone(),
                name: f.id.clone(),
                preview_urls: vec![format!("{FILE_SCHEME}{}", f.path.display())],
                duration: f.duration,
            })
            .collect();

        Ok(SearchPage {
            count: matches.len(),
            results,
        })
    }
}

impl AssetFetch for LocalLibrary {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let path = url.strip_prefix(FILE_SCHEME).ok_or_else(|| AssetError::Fetch {
            url: url.to_string(),
            reason: "not a file URL".into(),
        })?;
        fs::read(path).map_err(|e| AssetError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::wav_bytes;

    fn library() -> (tempfile::TempDir, LocalLibrary) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("drums")).unwrap();
        fs::write(dir.path().join("drums/kick_808.wav"), wav_bytes(&[0; 100], 1_000, 1)).unwrap();
        fs::write(dir.path().join("drums/Snare.WAV"), wav_bytes(&[0; 2_000], 1_000, 1)).unwrap();
        fs::write(dir.path().join("kick_long.wav"), wav_bytes(&[0; 5_000], 1_000, 1)).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not audio").unwrap();
        let lib = LocalLibrary::open(dir.path()).unwrap();
        (dir, lib)
    }

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            text: text.into(),
            page: 1,
            page_size: 10,
            ..SearchQuery::default()
        }
    }

    #[test]
    fn scans_only_wav_files() {
        let (_dir, lib) = library();
        assert_eq!(lib.len(), 3);
    }

    #[test]
    fn words_match_by_prefix() {
        let (_dir, lib) = library();
        let page = lib.search(&query("kick")).unwrap();
        assert_eq!(page.count, 2);
        let page = lib.search(&query("kick 808")).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, "drums/kick_808");
        let page = lib.search(&query("snare")).unwrap();
        assert_eq!(page.count, 1);
        assert!(lib.search(&query("cowbell")).unwrap().results.is_empty());
    }

    #[test]
    fn duration_filter() {
        let (_dir, lib) = library();
        let mut q = query("kick");
        q.max_duration = Some(1.0);
        let page = lib.search(&q).unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, "drums/kick_808");
    }

    #[test]
    fn pagination() {
        let (_dir, lib) = library();
        let mut q = query("");
        q.page_size = 2;
        assert_eq!(lib.search(&q).unwrap().results.len(), 2);
        let second = lib.search(&q.with_page(2)).unwrap();
        assert_eq!(second.count, 3);
        assert_eq!(second.results.len(), 1);
    }

    #[test]
    fn fetch_reads_preview_url() {
        let (_dir, lib) = library();
        let hit = &lib.search(&query("snare")).unwrap().results[0];
        let bytes = lib.fetch(&hit.preview_urls[0]).unwrap();
        assert!(bytes.starts_with(b"RIFF"));
        assert!(matches!(lib.fetch("http://example.com/a.wav"), Err(AssetError::Fetch { .. })));
    }
}
