//! Reconciler: compares combined award totals against the agency category summary.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::categories::CATEGORIES;
use crate::combine::{TableTag, parse_amount};
use crate::constants::columns::{CATEGORY_CODE, FISCAL_YEAR, INCREMENTAL_OUTLAY, OBLIGATED_AMOUNT};
use crate::errors::SyncError;
use crate::layout::{DataLayout, ensure_parent_dir};
use crate::table::Table;
use crate::transport::fs::{read_json, write_json_atomic};

/// Named node of the category summary tree.
///
/// A parent's amounts are the sum of the children pushed onto it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryNode {
    pub name: String,
    pub obligated_amount: f64,
    pub gross_outlay_amount: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SummaryNode>,
}

impl SummaryNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach `child`, adding its amounts to this node.
    pub fn push_child(&mut self, child: SummaryNode) {
        self.obligated_amount += child.obligated_amount;
        self.gross_outlay_amount += child.gross_outlay_amount;
        self.children.push(child);
    }

    /// First descendant named `name` (case-insensitive), depth first.
    pub fn find(&self, name: &str) -> Option<&SummaryNode> {
        self.children.iter().find_map(|child| {
            if child.name.eq_ignore_ascii_case(name) {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }
}

/// Fiscal year to summary tree, as persisted.
pub type CategorySummary = BTreeMap<i32, SummaryNode>;

pub fn save_summary(path: &Path, summary: &CategorySummary) -> Result<(), SyncError> {
    write_json_atomic(path, summary)
}

/// Stored summary, or `None` when it was never fetched.
pub fn load_summary(path: &Path) -> Result<Option<CategorySummary>, SyncError> {
    read_json(path)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Measure {
    Obligated,
    GrossOutlay,
}

impl Measure {
    fn label(self) -> &'static str {
        match self {
            Measure::Obligated => "obligated",
            Measure::GrossOutlay => "gross outlay",
        }
    }

    fn of(self, node: &SummaryNode) -> f64 {
        match self {
            Measure::Obligated => node.obligated_amount,
            Measure::GrossOutlay => node.gross_outlay_amount,
        }
    }
}

/// Obligated and outlay sums.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Amounts {
    pub obligated: f64,
    pub gross_outlay: f64,
}

impl Amounts {
    fn add(&mut self, obligated: f64, gross_outlay: f64) {
        self.obligated += obligated;
        self.gross_outlay += gross_outlay;
    }

    fn get(self, measure: Measure) -> f64 {
        match measure {
            Measure::Obligated => self.obligated,
            Measure::GrossOutlay => self.gross_outlay,
        }
    }
}

/// Combined-table sums for one fiscal year.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FiscalTotals {
    pub total: Amounts,
    pub by_category: BTreeMap<u8, Amounts>,
}

/// Sum the combined funding table per fiscal year and category.
///
/// Outlays are the sum of incremental outlays; rows without a fiscal year are skipped.
pub fn combined_totals(table: &Table) -> BTreeMap<i32, FiscalTotals> {
    let mut totals: BTreeMap<i32, FiscalTotals> = BTreeMap::new();
    for row in &table.rows {
        let Some(year) = table
            .cell(row, FISCAL_YEAR)
            .and_then(|value| value.trim().parse::<i32>().ok())
        else {
            continue;
        };
        let category = table
            .cell(row, CATEGORY_CODE)
            .and_then(|value| value.trim().parse::<u8>().ok())
            .unwrap_or_default();
        let obligated = parse_amount(table.cell(row, OBLIGATED_AMOUNT).unwrap_or_default());
        let outlay = parse_amount(table.cell(row, INCREMENTAL_OUTLAY).unwrap_or_default());
        let entry = totals.entry(year).or_default();
        entry.total.add(obligated, outlay);
        entry
            .by_category
            .entry(category)
            .or_default()
            .add(obligated, outlay);
    }
    totals
}

/// One summary-vs-combined comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub fiscal_year: i32,
    /// Category title, or `None` for the fiscal-year total.
    pub category: Option<&'static str>,
    pub measure: Measure,
    pub summary: f64,
    pub combined: f64,
}

impl Comparison {
    /// Absolute difference.
    pub fn difference(&self) -> f64 {
        (self.summary - self.combined).abs()
    }

    /// Difference as a percentage of the summary; undefined when the summary is zero.
    pub fn gap_percent(&self) -> Option<f64> {
        (self.summary != 0.0).then(|| self.difference() / self.summary.abs() * 100.0)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gap = match self.gap_percent() {
            Some(percent) => format!("{percent:.1}%"),
            None => "-".to_string(),
        };
        write!(
            f,
            "FY{} {} {}: summary {} combined {} difference {} gap {}",
            self.fiscal_year,
            self.category.unwrap_or("total"),
            self.measure.label(),
            format_usd(self.summary),
            format_usd(self.combined),
            format_usd(self.difference()),
            gap
        )
    }
}

/// Compare every summary fiscal year, in total and per known category.
pub fn compare(
    summary: &CategorySummary,
    combined: &BTreeMap<i32, FiscalTotals>,
) -> Vec<Comparison> {
    let empty = FiscalTotals::default();
    let mut comparisons = Vec::new();
    for (year, root) in summary {
        let totals = combined.get(year).unwrap_or(&empty);
        for measure in [Measure::Obligated, Measure::GrossOutlay] {
            comparisons.push(Comparison {
                fiscal_year: *year,
                category: None,
                measure,
                summary: measure.of(root),
                combined: totals.total.get(measure),
            });
        }
        for (code, title) in CATEGORIES {
            let node = root.find(title);
            let amounts = totals.by_category.get(&code).copied().unwrap_or_default();
            for measure in [Measure::Obligated, Measure::GrossOutlay] {
                comparisons.push(Comparison {
                    fiscal_year: *year,
                    category: Some(title),
                    measure,
                    summary: node.map(|node| measure.of(node)).unwrap_or(0.0),
                    combined: amounts.get(measure),
                });
            }
        }
    }
    comparisons
}

/// Regenerate the discrepancy report.
///
/// Returns `None` without writing anything when either the category summary
/// or the combined funding table is missing.
pub fn reconcile(layout: &DataLayout) -> Result<Option<Vec<Comparison>>, SyncError> {
    let Some(summary) = load_summary(&layout.category_summary())? else {
        info!("[spending_sync:reconcile] no category summary; skipping report");
        return Ok(None);
    };
    let combined_path = layout.combined_table(TableTag::FederalAccountFunding);
    if !combined_path.exists() {
        info!("[spending_sync:reconcile] no combined funding table; skipping report");
        return Ok(None);
    }
    let combined = combined_totals(&Table::read(&combined_path)?);
    let comparisons = compare(&summary, &combined);

    let report = layout.report();
    ensure_parent_dir(&report)?;
    let mut text = String::new();
    for comparison in &comparisons {
        text.push_str(&comparison.to_string());
        text.push('\n');
    }
    fs::write(&report, text)?;
    info!(
        "[spending_sync:reconcile] wrote {} comparisons to {}",
        comparisons.len(),
        report.display()
    );
    Ok(Some(comparisons))
}

/// Dollar amount with thousands separators and cents, e.g. `-$1,234.50`.
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u128;
    let raw = (cents / 100).to_string();
    let mut grouped_reversed = String::with_capacity(raw.len() + (raw.len() / 3));
    for (idx, ch) in raw.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped_reversed.push(',');
        }
        grouped_reversed.push(ch);
    }
    let dollars: String = grouped_reversed.chars().rev().collect();
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${dollars}.{:02}", cents % 100)
}
