//! Pagination collector: drains the award search into a deduplicated index.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::api::{SearchPage, SearchRequest, SearchScope, SpendingApi};
use crate::award_types::AwardType;
use crate::clock::Pacer;
use crate::config::CodeFilter;
use crate::constants::api::{ENTITY_ID_FIELD, FIRST_PAGE};
use crate::errors::SyncError;
use crate::transport::fs::{read_json, write_json_atomic};
use crate::types::{AwardRecord, EntityId};

/// Award records keyed by entity identifier. Sorted keys keep the persisted
/// file reproducible and give the batch downloader a stable order.
pub type AwardIndex = BTreeMap<EntityId, AwardRecord>;

/// Search scopes for a code filter: one per treasury account, or one id list.
pub fn search_scopes(filter: &CodeFilter) -> Vec<SearchScope> {
    match filter {
        CodeFilter::TreasuryAccounts(accounts) => accounts
            .iter()
            .cloned()
            .map(SearchScope::TreasuryAccount)
            .collect(),
        CodeFilter::AwardIds(ids) => vec![SearchScope::AwardIds(ids.clone())],
    }
}

/// Collects every search page for a set of scopes and award types.
pub struct PaginationCollector<'a> {
    api: &'a dyn SpendingApi,
    pacer: &'a Pacer,
    page_delay: std::time::Duration,
}

impl<'a> PaginationCollector<'a> {
    /// Create a collector sleeping `page_delay` between pages of one category.
    pub fn new(api: &'a dyn SpendingApi, pacer: &'a Pacer, page_delay: std::time::Duration) -> Self {
        Self {
            api,
            pacer,
            page_delay,
        }
    }

    /// Build the index for `filter` across `award_types`.
    ///
    /// Any remote failure aborts the whole build; nothing partial is returned.
    /// Rows for an identifier seen earlier are replaced by the later row.
    pub fn collect(
        &self,
        filter: &CodeFilter,
        award_types: &[AwardType],
    ) -> Result<AwardIndex, SyncError> {
        let mut index = AwardIndex::new();
        for scope in search_scopes(filter) {
            for award_type in award_types {
                self.collect_category(&scope, *award_type, &mut index)?;
            }
        }
        info!(
            "[spending_sync:index] collected {} awards across {} award types",
            index.len(),
            award_types.len()
        );
        Ok(index)
    }

    fn collect_category(
        &self,
        scope: &SearchScope,
        award_type: AwardType,
        index: &mut AwardIndex,
    ) -> Result<(), SyncError> {
        self.drain_pages(
            award_type.name(),
            |api, page| {
                api.search_page(&SearchRequest {
                    scope: scope.clone(),
                    award_type,
                    page,
                })
            },
            |row| {
                let entity_id = row
                    .get(ENTITY_ID_FIELD)
                    .and_then(|value| value.as_str())
                    .map(str::to_string);
                if let Some(entity_id) = entity_id {
                    index.insert(entity_id, row);
                }
            },
        )
    }

    /// Fetch pages from `FIRST_PAGE` until one reports no successor, handing
    /// every row to `sink`. Sleeps `page_delay` between pages.
    pub fn drain_pages(
        &self,
        label: &str,
        mut fetch: impl FnMut(&dyn SpendingApi, u32) -> Result<SearchPage, SyncError>,
        mut sink: impl FnMut(AwardRecord),
    ) -> Result<(), SyncError> {
        let mut page = FIRST_PAGE;
        loop {
            self.pacer.checkpoint()?;
            let result = fetch(self.api, page)?;
            info!(
                "[spending_sync:index] {} page {} -> {} rows (has_next={})",
                label,
                page,
                result.results.len(),
                result.has_next
            );
            for row in result.results {
                sink(row);
            }
            if !result.has_next {
                return Ok(());
            }
            page += 1;
            self.pacer.wait(self.page_delay)?;
        }
    }
}

/// Persist `index` at `path`, replacing any previous build atomically.
pub fn save_award_index(path: &Path, index: &AwardIndex) -> Result<(), SyncError> {
    write_json_atomic(path, index)
}

/// Load the persisted index; a missing file is a hard failure.
pub fn load_award_index(path: &Path) -> Result<AwardIndex, SyncError> {
    read_json(path)?.ok_or_else(|| {
        SyncError::MissingInput(format!("award index {} does not exist", path.display()))
    })
}
