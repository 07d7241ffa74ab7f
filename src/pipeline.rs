//! End-to-end orchestration: search, download, combine, summarize, reconcile.

use std::sync::Arc;

use tracing::info;

use crate::api::SpendingApi;
use crate::categories::HealthCatalog;
use crate::clock::{CancelFlag, Clock, Pacer, SystemClock};
use crate::combine::{CombineOutcome, TableTag, combine_tables};
use crate::config::SyncConfig;
use crate::constants::files::{
    AWARD_INDEX_ARTIFACT, CATEGORY_SUMMARY_ARTIFACT, TRANSACTIONS_ARTIFACT,
};
use crate::download::{BatchOptions, BatchReport, DownloadMachine, PollBudget, download_all};
use crate::errors::SyncError;
use crate::index::{AwardIndex, PaginationCollector, load_award_index, save_award_index};
use crate::layout::DataLayout;
use crate::reconcile::{CategorySummary, Comparison, reconcile, save_summary};
use crate::staleness::BuildTimestamps;
use crate::transactions::{collect_transactions, transactions_table};
use crate::transport::fs::remove_if_exists;
use crate::transport::http::HttpSpendingApi;
use crate::types::EntityId;

/// Outcome of [`SpendingSync::run_all`].
#[derive(Debug)]
pub struct RunSummary {
    pub indexed: usize,
    pub batch: BatchReport,
    pub combined: Vec<(TableTag, CombineOutcome)>,
    pub summary_refreshed: bool,
    /// Comparisons written to the report, `None` when no report was produced.
    pub comparisons: Option<usize>,
}

/// Owns the configuration, layout, remote API, and pacing for one run.
pub struct SpendingSync {
    config: SyncConfig,
    layout: DataLayout,
    api: Box<dyn SpendingApi>,
    pacer: Pacer,
}

impl SpendingSync {
    /// Build an orchestrator over an arbitrary API, clock, and cancel flag.
    pub fn new(
        config: SyncConfig,
        api: Box<dyn SpendingApi>,
        clock: Arc<dyn Clock>,
        cancel: CancelFlag,
    ) -> Result<Self, SyncError> {
        let config = config.validate()?;
        let layout = DataLayout::new(&config.data_root, &config.summary_name);
        Ok(Self {
            config,
            layout,
            api,
            pacer: Pacer::new(clock, cancel),
        })
    }

    /// Production wiring: HTTP transport and the system clock.
    pub fn from_config(config: SyncConfig, cancel: CancelFlag) -> Result<Self, SyncError> {
        let api = HttpSpendingApi::new(&config.api_base, config.pacing.http_timeout);
        Self::new(config, Box::new(api), Arc::new(SystemClock), cancel)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    fn timestamps(&self) -> Result<BuildTimestamps, SyncError> {
        BuildTimestamps::load(self.layout.build_timestamps(), self.config.staleness_cutoff)
    }

    /// Build (or reuse) the award index.
    ///
    /// A fresh index on disk is loaded without touching the network. A rebuild
    /// is all-or-nothing: any search failure leaves the previous file in place.
    pub fn search_awards(&self) -> Result<AwardIndex, SyncError> {
        let path = self.layout.award_index();
        let mut timestamps = self.timestamps()?;
        if !timestamps.check_overwrite(&path, AWARD_INDEX_ARTIFACT) {
            info!(
                "[spending_sync:pipeline] award index {} is fresh; reusing it",
                path.display()
            );
            return load_award_index(&path);
        }
        let collector =
            PaginationCollector::new(self.api.as_ref(), &self.pacer, self.config.pacing.page_delay);
        let index = collector.collect(&self.config.code_filter, &self.config.award_types)?;
        save_award_index(&path, &index)?;
        timestamps.record_build(AWARD_INDEX_ARTIFACT, self.pacer.now())?;
        info!(
            "[spending_sync:pipeline] saved {} awards to {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    /// Download raw data for every indexed award.
    pub fn download_awards(&self) -> Result<BatchReport, SyncError> {
        let index = load_award_index(&self.layout.award_index())?;
        let entity_ids: Vec<EntityId> = index.keys().cloned().collect();
        let pacing = &self.config.pacing;
        let machine = DownloadMachine::new(
            self.api.as_ref(),
            &self.layout,
            &self.pacer,
            PollBudget {
                max_attempts: pacing.max_poll_attempts,
                interval: pacing.poll_interval,
            },
            self.config.staleness_cutoff,
        );
        download_all(
            &machine,
            &self.pacer,
            &entity_ids,
            BatchOptions {
                chunk_size: pacing.chunk_size,
                transient_cooldown: pacing.transient_cooldown,
                stop_on_errors: self.config.stop_on_errors,
            },
        )
    }

    /// Rebuild stale combined tables from the raw downloads.
    pub fn combine_awards(&self) -> Result<Vec<(TableTag, CombineOutcome)>, SyncError> {
        let index = load_award_index(&self.layout.award_index())?;
        let mut timestamps = self.timestamps()?;
        combine_tables(
            &self.layout,
            &index,
            &self.config.code_filter,
            &mut timestamps,
            self.pacer.now(),
        )
    }

    /// Fetch the agency category summary for every configured fiscal year.
    ///
    /// Returns `false` when the stored summary is still fresh.
    pub fn refresh_summary(&self) -> Result<bool, SyncError> {
        let path = self.layout.category_summary();
        let mut timestamps = self.timestamps()?;
        if !timestamps.check_overwrite(&path, CATEGORY_SUMMARY_ARTIFACT) {
            info!("[spending_sync:pipeline] category summary is fresh; skipping");
            return Ok(false);
        }
        let mut summary = CategorySummary::new();
        for (position, fiscal_year) in self.config.fiscal_year_range().enumerate() {
            if position > 0 {
                self.pacer.wait(self.config.pacing.page_delay)?;
            }
            self.pacer.checkpoint()?;
            let node = self
                .api
                .category_summary(&self.config.agency_code, fiscal_year)?;
            info!(
                "[spending_sync:pipeline] FY{fiscal_year} summary: {} categories",
                node.children.len()
            );
            summary.insert(fiscal_year, node);
        }
        save_summary(&path, &summary)?;
        timestamps.record_build(CATEGORY_SUMMARY_ARTIFACT, self.pacer.now())?;
        Ok(true)
    }

    /// Collect every transaction for the configured scope and fiscal years into
    /// the combined transaction table, tagged with health categories.
    ///
    /// Tags come from the curated catalog when one exists under the data root,
    /// otherwise from description keywords. A rebuild that finds no rows removes
    /// the previous table.
    pub fn collect_transactions(&self) -> Result<CombineOutcome, SyncError> {
        let target = self.layout.combined_transactions();
        let mut timestamps = self.timestamps()?;
        if !timestamps.check_overwrite(&target, TRANSACTIONS_ARTIFACT) {
            info!("[spending_sync:pipeline] combined transactions are fresh; skipping");
            return Ok(CombineOutcome::Fresh);
        }
        let collector =
            PaginationCollector::new(self.api.as_ref(), &self.pacer, self.config.pacing.page_delay);
        let ledger = collect_transactions(
            &collector,
            &self.config.code_filter,
            self.config.fiscal_year_range(),
        )?;
        let catalog = HealthCatalog::load(&self.layout.health_catalog())?;
        if let Some(catalog) = &catalog {
            info!(
                "[spending_sync:pipeline] tagging with {} catalog awards",
                catalog.len()
            );
        }
        let table = transactions_table(&ledger, catalog.as_ref());
        if table.is_empty() {
            info!("[spending_sync:pipeline] transaction search returned no rows");
            remove_if_exists(&target)?;
            timestamps.forget(TRANSACTIONS_ARTIFACT)?;
            return Ok(CombineOutcome::Empty);
        }
        table.write(&target)?;
        timestamps.record_build(TRANSACTIONS_ARTIFACT, self.pacer.now())?;
        info!(
            "[spending_sync:pipeline] wrote {} transactions to {}",
            table.rows.len(),
            target.display()
        );
        Ok(CombineOutcome::Written(table.rows.len()))
    }

    /// Regenerate the discrepancy report.
    pub fn reconcile(&self) -> Result<Option<Vec<Comparison>>, SyncError> {
        reconcile(&self.layout)
    }

    /// Run every stage in order.
    pub fn run_all(&self) -> Result<RunSummary, SyncError> {
        let indexed = self.search_awards()?.len();
        let batch = self.download_awards()?;
        let combined = self.combine_awards()?;
        let summary_refreshed = self.refresh_summary()?;
        let comparisons = self.reconcile()?.map(|lines| lines.len());
        info!(
            "[spending_sync:pipeline] run complete: indexed={} finished={} skipped={} failed={}",
            indexed,
            batch.finished.len(),
            batch.skipped.len(),
            batch.failed.len()
        );
        Ok(RunSummary {
            indexed,
            batch,
            combined,
            summary_refreshed,
            comparisons,
        })
    }
}
