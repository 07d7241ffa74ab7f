//! Filesystem layout for raw downloads and derived artifacts.
//!
//! ```text
//! <data_root>/
//!   downloads/
//!     <entity>/                  extracted award tables
//!     pending_<entity>.json      mid-flight download job
//!     downloaded_<entity>.txt    last successful fetch (RFC 3339)
//!   <summary_name>/
//!     awards_index.json
//!     build_timestamps.json
//!     category_summary.json
//!     combined_<tag>.csv
//!     discrepancy_report.txt
//!     combined_transactions.csv
//!   categories/
//!     award_categories.csv       curated health tags (optional input)
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::combine::TableTag;
use crate::constants::files::{
    AWARD_INDEX_FILE, BUILD_TIMESTAMPS_FILE, CATEGORIES_DIR, CATEGORY_SUMMARY_FILE,
    COMBINED_TRANSACTIONS_FILE, DOWNLOADED_PREFIX, DOWNLOADS_DIR, HEALTH_CATALOG_FILE,
    PARTIAL_EXTENSION, PENDING_PREFIX, REPORT_FILE,
};
use crate::errors::SyncError;

/// Maps logical artifact names to paths under one data root.
#[derive(Clone, Debug)]
pub struct DataLayout {
    root: PathBuf,
    summary_name: String,
}

impl DataLayout {
    /// Create a layout rooted at `root` for the artifact set `summary_name`.
    pub fn new(root: impl Into<PathBuf>, summary_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            summary_name: summary_name.into(),
        }
    }

    /// Data root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every raw per-entity download.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    /// Folder holding derived artifacts for this summary name.
    pub fn summary_dir(&self) -> PathBuf {
        self.root.join(&self.summary_name)
    }

    /// Raw-data folder for one entity.
    pub fn entity_dir(&self, entity_id: &str) -> PathBuf {
        self.downloads_dir().join(file_safe(entity_id))
    }

    /// Temporary extraction folder that is renamed over `entity_dir` on success.
    pub fn entity_partial_dir(&self, entity_id: &str) -> PathBuf {
        self.downloads_dir()
            .join(format!("{}.{PARTIAL_EXTENSION}", file_safe(entity_id)))
    }

    /// Mid-flight download job record for one entity.
    pub fn pending_file(&self, entity_id: &str) -> PathBuf {
        self.downloads_dir()
            .join(format!("{PENDING_PREFIX}{}.json", file_safe(entity_id)))
    }

    /// Downloaded marker for one entity.
    pub fn downloaded_marker(&self, entity_id: &str) -> PathBuf {
        self.downloads_dir()
            .join(format!("{DOWNLOADED_PREFIX}{}.txt", file_safe(entity_id)))
    }

    /// Persisted award index.
    pub fn award_index(&self) -> PathBuf {
        self.summary_dir().join(AWARD_INDEX_FILE)
    }

    /// Build-timestamp map for derived artifacts.
    pub fn build_timestamps(&self) -> PathBuf {
        self.summary_dir().join(BUILD_TIMESTAMPS_FILE)
    }

    /// Independently sourced category summary.
    pub fn category_summary(&self) -> PathBuf {
        self.summary_dir().join(CATEGORY_SUMMARY_FILE)
    }

    /// Combined table for one tag.
    pub fn combined_table(&self, tag: TableTag) -> PathBuf {
        self.summary_dir()
            .join(format!("combined_{}.csv", tag.as_str()))
    }

    /// Combined transaction search results.
    pub fn combined_transactions(&self) -> PathBuf {
        self.summary_dir().join(COMBINED_TRANSACTIONS_FILE)
    }

    /// Curated health catalog shared by every summary name.
    pub fn health_catalog(&self) -> PathBuf {
        self.root.join(CATEGORIES_DIR).join(HEALTH_CATALOG_FILE)
    }

    /// Plain-text discrepancy report.
    pub fn report(&self) -> PathBuf {
        self.summary_dir().join(REPORT_FILE)
    }

    /// Return `path` after creating its parent folder.
    pub fn prepare(&self, path: PathBuf) -> Result<PathBuf, SyncError> {
        ensure_parent_dir(&path)?;
        Ok(path)
    }
}

/// Create the parent folder of `path` when it has one.
pub fn ensure_parent_dir(path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Replace path separators so an identifier is usable as a single path component.
fn file_safe(entity_id: &str) -> String {
    entity_id
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn per_entity_paths_share_the_downloads_folder() {
        let layout = DataLayout::new("/data", "usaid");
        let id = "ASST_NON_72061521CA00007_7200";
        assert_eq!(layout.entity_dir(id), PathBuf::from("/data/downloads").join(id));
        assert_eq!(
            layout.pending_file(id),
            PathBuf::from("/data/downloads/pending_ASST_NON_72061521CA00007_7200.json")
        );
        assert_eq!(
            layout.downloaded_marker(id),
            PathBuf::from("/data/downloads/downloaded_ASST_NON_72061521CA00007_7200.txt")
        );
        assert_eq!(
            layout.entity_partial_dir(id),
            PathBuf::from("/data/downloads/ASST_NON_72061521CA00007_7200.part")
        );
    }

    #[test]
    fn derived_artifacts_live_under_summary_name() {
        let layout = DataLayout::new("/data", "usaid");
        assert_eq!(
            layout.combined_table(TableTag::FederalAccountFunding),
            PathBuf::from("/data/usaid/combined_FederalAccountFunding.csv")
        );
        assert_eq!(
            layout.award_index(),
            PathBuf::from("/data/usaid/awards_index.json")
        );
        assert_eq!(layout.report(), PathBuf::from("/data/usaid/discrepancy_report.txt"));
        assert_eq!(
            layout.combined_transactions(),
            PathBuf::from("/data/usaid/combined_transactions.csv")
        );
        assert_eq!(
            layout.health_catalog(),
            PathBuf::from("/data/categories/award_categories.csv")
        );
    }

    #[test]
    fn identifiers_with_separators_stay_in_one_component() {
        let layout = DataLayout::new("/data", "usaid");
        let dir = layout.entity_dir("CONT_AWD/ab:c");
        assert_eq!(dir, PathBuf::from("/data/downloads/CONT_AWD_ab_c"));
    }

    #[test]
    fn prepare_creates_parent_folders() {
        let temp = tempdir().unwrap();
        let layout = DataLayout::new(temp.path(), "nested");
        let path = layout.prepare(layout.award_index()).unwrap();
        assert!(path.parent().unwrap().is_dir());
        ensure_parent_dir(Path::new("plain.txt")).unwrap();
    }
}
