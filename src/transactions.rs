//! Transaction collector: pages the transaction search per fiscal year into
//! one deduplicated, date-ordered table tagged with health categories.

use std::collections::BTreeMap;

use indexmap::IndexSet;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::TransactionRequest;
use crate::categories::{HealthCatalog, HealthTags, guess_health_tags};
use crate::config::CodeFilter;
use crate::constants::api::TRANSACTION_ID_FIELD;
use crate::constants::columns::{
    HEALTH_CATALOG_AWARD_ID, HEALTH_CATEGORIES, HEALTH_CATEGORY, TRANSACTION_ACTION_DATE,
    TRANSACTION_DESCRIPTION,
};
use crate::errors::SyncError;
use crate::index::{PaginationCollector, search_scopes};
use crate::table::Table;
use crate::types::AwardRecord;

/// Transactions keyed by their unique identifier.
pub type TransactionLedger = BTreeMap<String, AwardRecord>;

/// Nested objects in a transaction row and the flat columns they become.
const NESTED_FIELDS: [(&str, &[(&str, &str)]); 5] = [
    (
        "Assistance Listing",
        &[("cfda_number", "cfda_number"), ("cfda_title", "cfda_title")],
    ),
    (
        "NAICS",
        &[("code", "NAICS code"), ("description", "NAICS description")],
    ),
    (
        "PSC",
        &[("code", "PSC code"), ("description", "PSC description")],
    ),
    ("Primary Place of Performance", &[("country_name", "country_name")]),
    ("Recipient Location", &[("country_name", "recipient_country")]),
];

/// Page every fiscal year for every scope of `filter`.
///
/// A row seen again (same identifier) replaces the earlier copy. Rows without
/// an identifier are dropped. Any remote failure aborts the collection.
pub fn collect_transactions(
    collector: &PaginationCollector<'_>,
    filter: &CodeFilter,
    fiscal_years: impl IntoIterator<Item = i32>,
) -> Result<TransactionLedger, SyncError> {
    let fiscal_years: Vec<i32> = fiscal_years.into_iter().collect();
    let mut ledger = TransactionLedger::new();
    let mut unidentified = 0usize;
    for scope in search_scopes(filter) {
        for fiscal_year in &fiscal_years {
            collector.drain_pages(
                &format!("transactions FY{fiscal_year}"),
                |api, page| {
                    api.transaction_page(&TransactionRequest {
                        scope: scope.clone(),
                        fiscal_year: *fiscal_year,
                        page,
                    })
                },
                |row| {
                    let row = flatten_transaction(row);
                    match row.get(TRANSACTION_ID_FIELD).map(cell_text) {
                        Some(id) if !id.is_empty() => {
                            ledger.insert(id, row);
                        }
                        _ => unidentified += 1,
                    }
                },
            )?;
        }
    }
    if unidentified > 0 {
        warn!(
            "[spending_sync:transactions] dropped {unidentified} rows without '{TRANSACTION_ID_FIELD}'"
        );
    }
    info!(
        "[spending_sync:transactions] collected {} transactions across {} fiscal years",
        ledger.len(),
        fiscal_years.len()
    );
    Ok(ledger)
}

/// Replace the nested objects of one transaction row with flat columns.
///
/// Missing or null objects yield empty columns.
pub fn flatten_transaction(mut row: AwardRecord) -> AwardRecord {
    for (field, parts) in NESTED_FIELDS {
        let nested = row.remove(field);
        for (inner, column) in parts {
            let value = nested
                .as_ref()
                .and_then(|object| object.get(*inner))
                .cloned()
                .unwrap_or(Value::Null);
            row.insert(column.to_string(), value);
        }
    }
    row
}

/// Render the ledger as a table sorted by action date, with health tag columns.
///
/// Awards listed in `catalog` take its tags; every other row is tagged from its
/// description.
pub fn transactions_table(ledger: &TransactionLedger, catalog: Option<&HealthCatalog>) -> Table {
    let mut columns: IndexSet<&str> = IndexSet::new();
    for row in ledger.values() {
        columns.extend(row.keys().map(String::as_str));
    }
    let mut rows: Vec<&AwardRecord> = ledger.values().collect();
    rows.sort_by_key(|row| row.get(TRANSACTION_ACTION_DATE).map(cell_text).unwrap_or_default());

    let mut headers: Vec<String> = columns.iter().map(|name| name.to_string()).collect();
    headers.extend([HEALTH_CATEGORIES.to_string(), HEALTH_CATEGORY.to_string()]);
    let mut table = Table::with_headers(headers);
    for row in rows {
        let text = |name: &str| row.get(name).map(cell_text).unwrap_or_default();
        let description = text(TRANSACTION_DESCRIPTION);
        let tags = match catalog {
            Some(catalog) => catalog.tags_for(&text(HEALTH_CATALOG_AWARD_ID), &description),
            None => {
                let mut tags = HealthTags::default();
                guess_health_tags(&description, &mut tags);
                tags
            }
        };
        let mut cells: Vec<String> = columns.iter().map(|&name| text(name)).collect();
        cells.push(tags.joined());
        cells.push(tags.primary().unwrap_or_default().to_string());
        table.rows.push(cells);
    }
    table
}

/// CSV cell for a JSON value: strings verbatim, null empty, anything else as JSON.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
