//! End-of-run reconciliation
//!
//! Rewrites every non-empty result file with the final ordering and cutoff,
//! and lists the entities without any relevant page in the not-found report.

use std::path::Path;

use tokio::fs;
use tracing::{error, info, instrument, warn};

use crate::crawler::entities::Entity;
use crate::crawler::storage::{ResultStore, StorageError};

/// What the finalizer did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// Entities whose result file was rewritten
    pub with_results: usize,

    /// Entities listed in the not-found report, in entity list order
    pub not_found: Vec<String>,

    /// Result files that could not be rewritten
    pub write_errors: usize,
}

/// Finalize all entities and write the not-found report to `not_found_path`
///
/// A failed result file rewrite is logged and counted; only a failure to
/// write the report itself is returned as an error.
#[instrument(skip(entities, store))]
pub async fn finalize_run(
    entities: &[Entity],
    store: &mut ResultStore,
    not_found_path: &Path,
) -> Result<FinalizeOutcome, StorageError> {
    let mut outcome = FinalizeOutcome::default();

    for entity in entities {
        if store.has_results(&entity.name) {
            match store.finalize_entity(&entity.name).await {
                Ok(count) => {
                    info!(
                        "[{}] => {} written ({} relevant pages)",
                        entity.name,
                        store.path_for(&entity.name).display(),
                        count
                    );
                    outcome.with_results += 1;
                }
                Err(e) => {
                    error!("[{}] Failed to write final results: {}", entity.name, e);
                    outcome.write_errors += 1;
                }
            }
        } else {
            warn!("[{}] No relevant page found", entity.name);
            if let Err(e) = store.remove_stale(&entity.name).await {
                error!("[{}] Failed to remove stale result file: {}", entity.name, e);
            }
            outcome.not_found.push(entity.name.clone());
        }
    }

    write_report(not_found_path, &outcome.not_found).await?;

    info!(
        "Run finalized: {} entities with results, {} without",
        outcome.with_results,
        outcome.not_found.len()
    );
    Ok(outcome)
}

async fn write_report(path: &Path, names: &[String]) -> Result<(), StorageError> {
    let mut report = names.join("\n");
    if !report.is_empty() {
        report.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    if let Err(first) = fs::write(path, &report).await {
        warn!("Writing {} failed ({}), retrying", path.display(), first);
        fs::write(path, &report).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ScoredPage;
    use crate::crawler::config::TruncationPolicy;
    use crate::crawler::storage::StorageConfig;
    use chrono::Utc;
    use url::Url;

    fn entity(name: &str) -> Entity {
        Entity {
            name: name.to_string(),
            url: Url::parse(&format!("https://{}.ch", name.to_lowercase())).unwrap(),
            postal_code: None,
            region: None,
        }
    }

    fn page(url: &str, score: f64) -> ScoredPage {
        ScoredPage {
            url: url.to_string(),
            score: Some(score),
            keywords_found: Vec::new(),
            content: String::new(),
            municipality: "Lutry".to_string(),
            postal_code: None,
            region: None,
            depth: 0,
            crawled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_finalize_splits_found_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::with_config(StorageConfig {
            base_path: dir.path().to_path_buf(),
            top_k: Some(1),
            truncation: TruncationPolicy::AtClose,
            sort_by_score: true,
        });
        store.append("Lutry", page("https://lutry.ch/a", 1.0)).await.unwrap();
        store.append("Lutry", page("https://lutry.ch/b", 4.0)).await.unwrap();
        std::fs::write(dir.path().join("Pully.json"), "[]").unwrap();

        let entities = vec![entity("Lutry"), entity("Pully"), entity("Morges")];
        let report = dir.path().join("communes_not_found.txt");
        let outcome = finalize_run(&entities, &mut store, &report).await.unwrap();

        assert_eq!(outcome.with_results, 1);
        assert_eq!(outcome.not_found, vec!["Pully", "Morges"]);
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "Pully\nMorges\n");
        assert!(!dir.path().join("Pully.json").exists());

        let lutry = store.load("Lutry").await.unwrap();
        assert_eq!(lutry.len(), 1);
        assert_eq!(lutry[0].url, "https://lutry.ch/b");
    }

    #[tokio::test]
    async fn test_empty_report_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::with_config(StorageConfig {
            base_path: dir.path().to_path_buf(),
            ..StorageConfig::default()
        });
        let report = dir.path().join("report.txt");
        std::fs::write(&report, "Stale\n").unwrap();

        let outcome = finalize_run(&[], &mut store, &report).await.unwrap();

        assert!(outcome.not_found.is_empty());
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "");
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::with_config(StorageConfig {
            base_path: dir.path().to_path_buf(),
            ..StorageConfig::default()
        });
        store.append("Lutry", page("https://lutry.ch/a", 1.0)).await.unwrap();
        let before = std::fs::read_to_string(store.path_for("Lutry")).unwrap();

        let report = dir.path().join("report.txt");
        finalize_run(&[entity("Lutry")], &mut store, &report).await.unwrap();
        let after = std::fs::read_to_string(store.path_for("Lutry")).unwrap();

        assert_eq!(before, after);
    }
}
