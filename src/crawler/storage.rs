//! Per-entity result persistence
//!
//! Every relevant page is appended to its entity's in-memory result set and
//! the whole set is immediately rewritten to `<base>/<entity>.json`, so a
//! crash loses at most the page being processed.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};

use super::ScoredPage;
use super::config::{CrawlerConfig, TruncationPolicy};
use crate::error::Error as CrateError;

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\<>:"|?*\x00-\x1f]"#).expect("file name pattern is valid"));

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory receiving one JSON file per entity
    pub base_path: PathBuf,

    /// Number of results kept per entity, `None` for unbounded
    pub top_k: Option<usize>,

    /// When the top-K cutoff applies
    pub truncation: TruncationPolicy,

    /// Order results by descending score; insertion order otherwise
    pub sort_by_score: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("output_subsidies"),
            top_k: Some(3),
            truncation: TruncationPolicy::DuringRun,
            sort_by_score: true,
        }
    }
}

impl From<&CrawlerConfig> for StorageConfig {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            base_path: config.output_dir.clone(),
            top_k: config.top_k,
            truncation: config.truncation,
            sort_by_score: config.keywords.is_scored(),
        }
    }
}

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StorageError> for CrateError {
    fn from(err: StorageError) -> Self {
        CrateError::Storage(err.to_string())
    }
}

type Result<T> = std::result::Result<T, StorageError>;

/// Make an entity name safe to use as a file name
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = UNSAFE_FILE_CHARS.replace_all(name, "_");
    let trimmed = replaced.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Result sets of all entities plus their files on disk
#[derive(Debug, Default)]
pub struct ResultStore {
    config: StorageConfig,
    sets: HashMap<String, Vec<ScoredPage>>,
}

impl ResultStore {
    /// Create a new store with custom configuration
    pub fn with_config(config: StorageConfig) -> Self {
        Self {
            config,
            sets: HashMap::new(),
        }
    }

    /// Path of the result file for `entity`
    pub fn path_for(&self, entity: &str) -> PathBuf {
        self.config
            .base_path
            .join(format!("{}.json", sanitize_file_name(entity)))
    }

    /// Current in-memory results for `entity`
    pub fn results(&self, entity: &str) -> &[ScoredPage] {
        self.sets.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `entity` has at least one relevant page
    pub fn has_results(&self, entity: &str) -> bool {
        !self.results(entity).is_empty()
    }

    /// Add a page to an entity's results and persist the full set
    ///
    /// Returns the number of results written. The page stays in memory even
    /// when the write fails.
    pub async fn append(&mut self, entity: &str, page: ScoredPage) -> Result<usize> {
        let truncate = self.config.truncation == TruncationPolicy::DuringRun;
        let set = self.sets.entry(entity.to_string()).or_default();
        set.push(page);
        order(set, &self.config, truncate);

        let snapshot = set.clone();
        self.persist(entity, &snapshot).await?;
        Ok(snapshot.len())
    }

    /// Apply the final ordering and cutoff to an entity and rewrite its file
    ///
    /// Does nothing for entities without results.
    pub async fn finalize_entity(&mut self, entity: &str) -> Result<usize> {
        let Some(set) = self.sets.get_mut(entity) else {
            return Ok(0);
        };
        if set.is_empty() {
            return Ok(0);
        }
        order(set, &self.config, true);

        let snapshot = set.clone();
        self.persist(entity, &snapshot).await?;
        Ok(snapshot.len())
    }

    /// Delete a result file left over from an earlier run
    pub async fn remove_stale(&self, entity: &str) -> Result<bool> {
        let path = self.path_for(entity);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed stale result file {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Read an entity's result file
    pub async fn load(&self, entity: &str) -> Result<Vec<ScoredPage>> {
        let raw = fs::read_to_string(self.path_for(entity)).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the set, retrying once with the same content
    async fn persist(&self, entity: &str, pages: &[ScoredPage]) -> Result<()> {
        let path = self.path_for(entity);
        let json = serde_json::to_string_pretty(pages)?;

        match write_atomic(&path, &json).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!("[{}] Writing {} failed ({}), retrying", entity, path.display(), first);
                write_atomic(&path, &json).await.map_err(StorageError::from)
            }
        }
    }
}

fn order(set: &mut Vec<ScoredPage>, config: &StorageConfig, truncate: bool) {
    if config.sort_by_score {
        set.sort_by(|a, b| b.score.unwrap_or(0.0).total_cmp(&a.score.unwrap_or(0.0)));
    }
    if truncate {
        if let Some(k) = config.top_k {
            set.truncate(k);
        }
    }
}

/// Write through a temporary file so readers never see a partial file
async fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio_test::assert_ok;

    fn page(url: &str, score: Option<f64>) -> ScoredPage {
        ScoredPage {
            url: url.to_string(),
            score,
            keywords_found: vec!["CONTENT:subvention".to_string()],
            content: "subvention photovoltaïque".to_string(),
            municipality: "Lutry".to_string(),
            postal_code: None,
            region: None,
            depth: 0,
            crawled_at: Utc::now(),
        }
    }

    fn store(dir: &Path, top_k: Option<usize>, truncation: TruncationPolicy) -> ResultStore {
        ResultStore::with_config(StorageConfig {
            base_path: dir.to_path_buf(),
            top_k,
            truncation,
            sort_by_score: true,
        })
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Lutry"), "Lutry");
        assert_eq!(sanitize_file_name("Bourg-en-Lavaux"), "Bourg-en-Lavaux");
        assert_eq!(sanitize_file_name("Saint-Légier-La Chiésaz"), "Saint-Légier-La Chiésaz");
        assert_eq!(sanitize_file_name("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_file_name("A:B*C?"), "A_B_C_");
        assert_eq!(sanitize_file_name(" .. "), "_");
    }

    #[tokio::test]
    async fn test_append_writes_what_is_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), None, TruncationPolicy::DuringRun);

        assert_ok!(store.append("Lutry", page("https://lutry.ch/a", Some(1.0))).await);
        assert_eq!(store.load("Lutry").await.unwrap(), store.results("Lutry"));

        assert_ok!(store.append("Lutry", page("https://lutry.ch/b", Some(7.5))).await);
        let on_disk = store.load("Lutry").await.unwrap();
        assert_eq!(on_disk, store.results("Lutry"));
        assert_eq!(on_disk[0].url, "https://lutry.ch/b");
        assert!(dir.path().join("Lutry.json").exists());
        assert!(!dir.path().join("Lutry.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_top_k_during_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), Some(2), TruncationPolicy::DuringRun);

        for (i, score) in [1.0, 5.0, 3.0, 0.5].into_iter().enumerate() {
            let written = store
                .append("Lutry", page(&format!("https://lutry.ch/{}", i), Some(score)))
                .await
                .unwrap();
            assert!(written <= 2);
        }

        let scores: Vec<_> = store.results("Lutry").iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![Some(5.0), Some(3.0)]);
        assert_eq!(store.load("Lutry").await.unwrap(), store.results("Lutry"));
    }

    #[tokio::test]
    async fn test_top_k_at_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), Some(1), TruncationPolicy::AtClose);

        store.append("Lutry", page("https://lutry.ch/a", Some(1.0))).await.unwrap();
        store.append("Lutry", page("https://lutry.ch/b", Some(2.0))).await.unwrap();
        assert_eq!(store.load("Lutry").await.unwrap().len(), 2);

        assert_eq!(store.finalize_entity("Lutry").await.unwrap(), 1);
        let on_disk = store.load("Lutry").await.unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].url, "https://lutry.ch/b");
    }

    #[tokio::test]
    async fn test_insertion_order_without_scores() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::with_config(StorageConfig {
            base_path: dir.path().to_path_buf(),
            top_k: None,
            truncation: TruncationPolicy::DuringRun,
            sort_by_score: false,
        });

        for url in ["https://lutry.ch/z", "https://lutry.ch/a", "https://lutry.ch/m"] {
            store.append("Lutry", page(url, None)).await.unwrap();
        }

        let urls: Vec<_> = store.load("Lutry").await.unwrap().into_iter().map(|p| p.url).collect();
        assert_eq!(urls, vec!["https://lutry.ch/z", "https://lutry.ch/a", "https://lutry.ch/m"]);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), None, TruncationPolicy::DuringRun);

        store.append("Lutry", page("https://lutry.ch/first", Some(2.0))).await.unwrap();
        store.append("Lutry", page("https://lutry.ch/second", Some(2.0))).await.unwrap();

        assert_eq!(store.results("Lutry")[0].url, "https://lutry.ch/first");
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let mut store = store(&blocker, None, TruncationPolicy::DuringRun);
        let result = store.append("Lutry", page("https://lutry.ch/", Some(1.0))).await;

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(store.results("Lutry").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), None, TruncationPolicy::DuringRun);
        std::fs::write(dir.path().join("Pully.json"), "[]").unwrap();

        assert!(store.remove_stale("Pully").await.unwrap());
        assert!(!store.remove_stale("Pully").await.unwrap());
        assert!(!dir.path().join("Pully.json").exists());
    }

    #[tokio::test]
    async fn test_finalize_without_results_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(dir.path(), Some(3), TruncationPolicy::DuringRun);

        assert_eq!(store.finalize_entity("Pully").await.unwrap(), 0);
        assert!(!store.path_for("Pully").exists());
    }
}
