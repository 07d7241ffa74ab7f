//! Combiner: merges per-entity raw tables into one artifact per table tag.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};

use crate::categories::{category_from_object_class, category_title};
use crate::config::CodeFilter;
use crate::constants::columns::{
    ACTION_DATE, CATEGORY_CODE, CATEGORY_TITLE, CUMULATIVE_OUTLAY, ENTITY_ID, FISCAL_PERIOD,
    FISCAL_YEAR, INCREMENTAL_OUTLAY, OBJECT_CLASS_CODE, SUBAWARD_ACCOUNTS, SUBAWARD_ACTION_DATE,
    SUBMISSION_PERIOD, TRANSACTION_ACCOUNTS, TREASURY_ACCOUNT_SYMBOL,
};
use crate::constants::normalize::FISCAL_YEAR_START_MONTH;
use crate::download::machine::parse_action_date;
use crate::errors::SyncError;
use crate::index::AwardIndex;
use crate::layout::DataLayout;
use crate::normalize::{OutlayPoint, normalize, parse_submission_period};
use crate::staleness::BuildTimestamps;
use crate::table::Table;
use crate::transport::fs::{find_tables, remove_if_exists};
use crate::types::{ArtifactName, Cell};

/// The three extracted tables each award archive is expected to contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableTag {
    /// Per-submission funding lines with cumulative outlays.
    FederalAccountFunding,
    /// Award transaction history.
    TransactionHistory,
    /// Sub-award records.
    SubAwards,
}

impl TableTag {
    pub const ALL: [TableTag; 3] = [
        TableTag::FederalAccountFunding,
        TableTag::TransactionHistory,
        TableTag::SubAwards,
    ];

    /// File-name tag, matched as `*<tag>_<n>.csv`.
    pub fn as_str(self) -> &'static str {
        match self {
            TableTag::FederalAccountFunding => "FederalAccountFunding",
            TableTag::TransactionHistory => "TransactionHistory",
            TableTag::SubAwards => "Sub-Awards",
        }
    }

    /// Staleness record name of the combined artifact.
    pub fn artifact_name(self) -> ArtifactName {
        format!("combined_{}", self.as_str())
    }

    /// Column holding the treasury account(s) a row is filtered on.
    pub fn account_column(self) -> &'static str {
        match self {
            TableTag::FederalAccountFunding => TREASURY_ACCOUNT_SYMBOL,
            TableTag::TransactionHistory => TRANSACTION_ACCOUNTS,
            TableTag::SubAwards => SUBAWARD_ACCOUNTS,
        }
    }

    /// True when the account column holds exactly one code.
    fn exact_account_match(self) -> bool {
        matches!(self, TableTag::FederalAccountFunding)
    }

    /// Date column used to derive fiscal year and period.
    fn date_column(self) -> Option<&'static str> {
        match self {
            TableTag::FederalAccountFunding => None,
            TableTag::TransactionHistory => Some(ACTION_DATE),
            TableTag::SubAwards => Some(SUBAWARD_ACTION_DATE),
        }
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one combined artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CombineOutcome {
    /// Written with this many rows.
    Written(usize),
    /// Existing artifact is fresh; left untouched.
    Fresh,
    /// Nothing passed the filter; any previous artifact was removed.
    Empty,
}

/// Build every combined table the staleness policy says is out of date.
///
/// Fails with `MissingInput` when the raw downloads folder does not exist.
/// An empty index is a no-op.
pub fn combine_tables(
    layout: &DataLayout,
    index: &AwardIndex,
    filter: &CodeFilter,
    timestamps: &mut BuildTimestamps,
    now: DateTime<Utc>,
) -> Result<Vec<(TableTag, CombineOutcome)>, SyncError> {
    let downloads = layout.downloads_dir();
    if !downloads.is_dir() {
        return Err(SyncError::MissingInput(format!(
            "raw downloads folder {} does not exist",
            downloads.display()
        )));
    }
    if index.is_empty() {
        info!("[spending_sync:combine] award index is empty; nothing to combine");
        return Ok(TableTag::ALL
            .iter()
            .map(|tag| (*tag, CombineOutcome::Empty))
            .collect());
    }

    let mut outcomes = Vec::with_capacity(TableTag::ALL.len());
    for tag in TableTag::ALL {
        let target = layout.combined_table(tag);
        if !timestamps.check_overwrite(&target, &tag.artifact_name()) {
            info!("[spending_sync:combine] {tag} is fresh; skipping");
            outcomes.push((tag, CombineOutcome::Fresh));
            continue;
        }
        let mut combined = combine_tag(layout, index, filter, tag)?;
        combined.dedup_rows();
        if combined.is_empty() {
            info!("[spending_sync:combine] {tag}: no rows passed the filter");
            remove_if_exists(&target)?;
            timestamps.forget(&tag.artifact_name())?;
            outcomes.push((tag, CombineOutcome::Empty));
            continue;
        }
        combined.write(&target)?;
        timestamps.record_build(&tag.artifact_name(), now)?;
        info!(
            "[spending_sync:combine] {tag}: wrote {} rows to {}",
            combined.rows.len(),
            target.display()
        );
        outcomes.push((tag, CombineOutcome::Written(combined.rows.len())));
    }
    Ok(outcomes)
}

fn combine_tag(
    layout: &DataLayout,
    index: &AwardIndex,
    filter: &CodeFilter,
    tag: TableTag,
) -> Result<Table, SyncError> {
    let mut parts = Vec::new();
    for entity_id in index.keys() {
        let dir = layout.entity_dir(entity_id);
        let paths = find_tables(&dir, tag.as_str());
        if paths.is_empty() {
            if dir.is_dir() {
                warn!("[spending_sync:combine] {entity_id} has no {tag} table");
            }
            continue;
        }
        for path in paths {
            let table = Table::read(&path)?;
            let mut table = filter_rows(table, filter, tag);
            if table.is_empty() {
                continue;
            }
            if table.column(ENTITY_ID).is_none() {
                table.push_column(ENTITY_ID, |_| entity_id.clone());
            }
            let table = match tag.date_column() {
                Some(column) => with_fiscal_calendar(table, column),
                None => with_incremental_outlays(table),
            };
            parts.push(table);
        }
    }
    Ok(Table::concat(parts))
}

/// Keep rows whose account column matches the treasury account filter.
///
/// An award id filter keeps every row; the index already scopes the folders.
pub fn filter_rows(mut table: Table, filter: &CodeFilter, tag: TableTag) -> Table {
    let accounts = match filter {
        CodeFilter::TreasuryAccounts(accounts) => accounts,
        CodeFilter::AwardIds(_) => return table,
    };
    let Some(column) = table.column(tag.account_column()) else {
        table.rows.clear();
        return table;
    };
    let exact = tag.exact_account_match();
    table.rows.retain(|row| {
        let value = row.get(column).map(String::as_str).unwrap_or_default();
        accounts.iter().any(|account| {
            if exact {
                value.trim() == account
            } else {
                value.contains(account.as_str())
            }
        })
    });
    table
}

/// Fiscal year and period of a calendar date; the fiscal year starts in October.
pub fn fiscal_calendar(year: i32, month: u32) -> (i32, u32) {
    if month >= FISCAL_YEAR_START_MONTH {
        (year + 1, month - FISCAL_YEAR_START_MONTH + 1)
    } else {
        (year, month + 12 - FISCAL_YEAR_START_MONTH + 1)
    }
}

fn with_fiscal_calendar(mut table: Table, date_column: &str) -> Table {
    let column = table.column(date_column);
    let derived: Vec<Option<(i32, u32)>> = table
        .rows
        .iter()
        .map(|row| {
            column
                .and_then(|idx| row.get(idx))
                .and_then(|value| parse_action_date(value))
                .map(|date| fiscal_calendar(date.year(), date.month()))
        })
        .collect();
    let mut years = derived.iter();
    table.push_column(FISCAL_YEAR, |_| {
        years
            .next()
            .copied()
            .flatten()
            .map(|(year, _)| year.to_string())
            .unwrap_or_default()
    });
    let mut periods = derived.iter();
    table.push_column(FISCAL_PERIOD, |_| {
        periods
            .next()
            .copied()
            .flatten()
            .map(|(_, period)| period.to_string())
            .unwrap_or_default()
    });
    table
}

/// Annotate funding rows with fiscal year, period, category, and incremental outlay.
///
/// Rows merged away by the unknown-category heuristic are removed. Rows whose
/// submission period cannot be parsed are kept without an increment.
fn with_incremental_outlays(table: Table) -> Table {
    let period_col = table.column(SUBMISSION_PERIOD);
    let class_col = table.column(OBJECT_CLASS_CODE);
    let outlay_col = table.column(CUMULATIVE_OUTLAY);
    fn cell(row: &[Cell], col: Option<usize>) -> String {
        col.and_then(|idx| row.get(idx)).cloned().unwrap_or_default()
    }

    let mut points = Vec::new();
    let mut point_rows = Vec::new();
    let mut unparsed = Vec::new();
    for (idx, row) in table.rows.iter().enumerate() {
        match parse_submission_period(&cell(row, period_col)) {
            Some((fiscal_year, period)) => {
                points.push(OutlayPoint {
                    fiscal_year,
                    period,
                    category: category_from_object_class(&cell(row, class_col)),
                    cumulative: parse_amount(&cell(row, outlay_col)),
                });
                point_rows.push(idx);
            }
            None => unparsed.push(idx),
        }
    }

    let mut headers = table.headers.clone();
    headers.extend(
        [FISCAL_YEAR, FISCAL_PERIOD, CATEGORY_CODE, CATEGORY_TITLE, INCREMENTAL_OUTLAY]
            .iter()
            .map(|name| name.to_string()),
    );
    let mut annotated = Table::with_headers(headers);
    for point in normalize(&points) {
        let mut row = table.rows[point_rows[point.source]].clone();
        row.resize(table.headers.len(), String::new());
        row.extend([
            point.fiscal_year.to_string(),
            point.period.to_string(),
            point.category.to_string(),
            category_title(point.category).to_string(),
            format_amount(point.incremental),
        ]);
        annotated.rows.push(row);
    }
    for idx in unparsed {
        let mut row = table.rows[idx].clone();
        row.resize(table.headers.len(), String::new());
        let category = category_from_object_class(&cell(&row, class_col));
        row.extend([
            String::new(),
            String::new(),
            category.to_string(),
            category_title(category).to_string(),
            String::new(),
        ]);
        annotated.rows.push(row);
    }
    annotated
}

/// Parse a dollar cell; blanks, garbage, and non-finite values count as zero.
pub fn parse_amount(value: &str) -> f64 {
    value
        .trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
        .unwrap_or(0.0)
}

/// Render an amount with cent precision.
pub fn format_amount(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid "-0.00".
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.2}")
}
