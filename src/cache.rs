use crate::config::CACHE_VERSION;
use crate::labels::LabelIndex;
use anyhow::{bail, Context, Result};
use bincode::Options;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

#[derive(Serialize, Deserialize)]
pub struct CacheMetadata {
    pub version: u32,
    pub input_path: String,
    pub input_mtime: u64,
    pub input_size: u64,
    pub language: String,
    pub label_count: usize,
}

#[derive(Deserialize)]
struct LabelCacheDe {
    metadata: CacheMetadata,
    labels: FxHashMap<String, String>,
}

/// Borrows the label map so saving does not clone every label.
#[derive(Serialize)]
struct LabelCacheSer<'a> {
    metadata: CacheMetadata,
    labels: &'a FxHashMap<String, String>,
}

pub fn cache_path(output_dir: &str) -> PathBuf {
    Path::new(output_dir).join("labels.cache")
}

/// `(mtime seconds, size bytes)` of an input file.
pub(crate) fn input_fingerprint(input_path: &str) -> Result<(u64, u64)> {
    let metadata = fs::metadata(input_path)
        .with_context(|| format!("Failed to get metadata for: {}", input_path))?;
    let mtime = metadata
        .modified()
        .context("Failed to get modification time")?
        .duration_since(SystemTime::UNIX_EPOCH)
        .context("Invalid modification time")?
        .as_secs();
    Ok((mtime, metadata.len()))
}

fn read_cache(cache_path: &Path) -> Result<LabelCacheDe> {
    let file_size = fs::metadata(cache_path).map(|m| m.len()).unwrap_or(0);
    let file = File::open(cache_path)
        .with_context(|| format!("Failed to open cache file: {:?}", cache_path))?;
    let reader = BufReader::with_capacity(256 * 1024, file);

    bincode::options()
        .with_limit(file_size.saturating_add(1024))
        .deserialize_from(reader)
        .context("Failed to deserialize label cache")
}

/// Returns `Ok(Some(index))` if the cache matches the dump and language,
/// `Ok(None)` if it is missing, stale or corrupt.
pub fn try_load_labels(
    cache_path: &Path,
    input_path: &str,
    language: &str,
) -> Result<Option<LabelIndex>> {
    if !cache_path.exists() {
        return Ok(None);
    }

    let cache = match read_cache(cache_path) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Label cache is corrupt or unreadable");
            return Ok(None);
        }
    };
    let meta = &cache.metadata;

    if meta.version != CACHE_VERSION {
        info!(
            cached = meta.version,
            current = CACHE_VERSION,
            "Label cache version mismatch"
        );
        return Ok(None);
    }

    if meta.input_path != input_path {
        info!(
            cached = meta.input_path,
            current = input_path,
            "Label cache input path mismatch"
        );
        return Ok(None);
    }

    if meta.language != language {
        info!(
            cached = meta.language,
            current = language,
            "Label cache language mismatch"
        );
        return Ok(None);
    }

    let (mtime, size) = input_fingerprint(input_path)?;
    if meta.input_mtime != mtime || meta.input_size != size {
        info!(
            cached_mtime = meta.input_mtime,
            current_mtime = mtime,
            cached_size = meta.input_size,
            current_size = size,
            "Entity dump has changed since label cache was created"
        );
        return Ok(None);
    }

    info!(labels = meta.label_count, "Labels loaded from cache");

    Ok(Some(LabelIndex::from_map(cache.labels)))
}

/// Writes the cache next to the other outputs, atomically via rename.
pub fn save_labels(
    index: &LabelIndex,
    input_path: &str,
    language: &str,
    output_dir: &str,
) -> Result<PathBuf> {
    let path = cache_path(output_dir);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let (mtime, size) = input_fingerprint(input_path)?;
    let cache = LabelCacheSer {
        metadata: CacheMetadata {
            version: CACHE_VERSION,
            input_path: input_path.to_string(),
            input_mtime: mtime,
            input_size: size,
            language: language.to_string(),
            label_count: index.len(),
        },
        labels: index.map(),
    };

    let tmp_path = path.with_extension("cache.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp cache file: {:?}", tmp_path))?;

    bincode::DefaultOptions::new()
        .serialize_into(BufWriter::new(file), &cache)
        .context("Failed to serialize label cache")?;

    fs::rename(&tmp_path, &path)
        .with_context(|| format!("Failed to rename temp cache file to: {:?}", path))?;

    info!(labels = index.len(), path = ?path, "Label cache saved");

    Ok(path)
}

/// Loads a label cache without checking it against any dump.
pub fn load_labels(cache_path: &Path) -> Result<LabelIndex> {
    if !cache_path.exists() {
        bail!("Cache file does not exist: {:?}", cache_path);
    }

    let cache = read_cache(cache_path)?;
    info!(
        labels = cache.metadata.label_count,
        language = cache.metadata.language,
        "Labels loaded from cache"
    );

    Ok(LabelIndex::from_map(cache.labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_input(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("entities.xml");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "<mediawiki></mediawiki>").unwrap();
        path
    }

    fn create_test_index() -> LabelIndex {
        [("P31", "instance of"), ("Q5", "human")].into_iter().collect()
    }

    #[test]
    fn cache_path_returns_correct_path() {
        assert_eq!(
            cache_path("/output/dir"),
            PathBuf::from("/output/dir/labels.cache")
        );
    }

    #[test]
    fn missing_cache_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.cache");
        assert!(try_load_labels(&path, "/some/input", "en").unwrap().is_none());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let output_dir = dir.path().to_str().unwrap();

        let saved = save_labels(&create_test_index(), input_str, "en", output_dir).unwrap();
        assert_eq!(saved, cache_path(output_dir));

        let loaded = try_load_labels(&saved, input_str, "en").unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("P31"), Some("instance of"));

        let unchecked = load_labels(&saved).unwrap();
        assert_eq!(unchecked.get("Q5"), Some("human"));
    }

    #[test]
    fn invalidated_by_language_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let output_dir = dir.path().to_str().unwrap();

        let saved = save_labels(&create_test_index(), input_str, "en", output_dir).unwrap();
        assert!(try_load_labels(&saved, input_str, "de").unwrap().is_none());
    }

    #[test]
    fn invalidated_by_input_change() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let input_str = input_path.to_str().unwrap();
        let output_dir = dir.path().to_str().unwrap();

        let saved = save_labels(&create_test_index(), input_str, "en", output_dir).unwrap();

        let mut file = File::create(&input_path).unwrap();
        writeln!(file, "<mediawiki><page></page></mediawiki>").unwrap();

        assert!(try_load_labels(&saved, input_str, "en").unwrap().is_none());
    }

    #[test]
    fn invalidated_by_different_input_path() {
        let dir = TempDir::new().unwrap();
        let input_path = create_test_input(&dir);
        let output_dir = dir.path().to_str().unwrap();

        let saved =
            save_labels(&create_test_index(), input_path.to_str().unwrap(), "en", output_dir)
                .unwrap();
        assert!(try_load_labels(&saved, "/different/input", "en").unwrap().is_none());
    }

    #[test]
    fn corrupt_cache_is_none() {
        let dir = TempDir::new().unwrap();
        let cache_file = dir.path().join("labels.cache");
        File::create(&cache_file)
            .unwrap()
            .write_all(b"not valid bincode data")
            .unwrap();

        assert!(try_load_labels(&cache_file, "/some/input", "en").unwrap().is_none());
    }

    #[test]
    fn load_labels_fails_for_nonexistent_file() {
        assert!(load_labels(Path::new("/nonexistent/labels.cache")).is_err());
    }
}
