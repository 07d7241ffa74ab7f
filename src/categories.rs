//! Award categories.
//!
//! Object-class categories bucket funding lines for reconciliation. Health
//! program tags label individual awards, either from a curated catalog keyed
//! by award id or from keywords in the transaction description.

use std::collections::BTreeMap;
use std::path::Path;

use crate::constants::columns::{HEALTH_CATALOG_AWARD_ID, HEALTH_FALSE_VALUES};
use crate::constants::normalize::UNKNOWN_CATEGORY;
use crate::errors::SyncError;
use crate::table::Table;
use crate::types::AwardKey;

/// Known category codes and titles, in report order.
pub const CATEGORIES: [(u8, &str); 5] = [
    (0, "Unknown"),
    (1, "Personnel compensation and benefits"),
    (2, "Contractual services and supplies"),
    (3, "Acquisition of assets"),
    (4, "Grants and fixed charges"),
];

/// Title for a category code, `Unknown` for anything outside the table.
pub fn category_title(code: u8) -> &'static str {
    CATEGORIES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, title)| *title)
        .unwrap_or(CATEGORIES[0].1)
}

/// Category code for a raw object class (`251`, `41.0`, `000`).
///
/// The major category is the leading digit; blanks and unrecognized digits map
/// to the unknown category. That includes `9xx` ("Other"), so those lines are
/// subject to the normalizer's unknown-category merge and can end up counted
/// under a known category for the year.
pub fn category_from_object_class(object_class: &str) -> u8 {
    object_class
        .trim()
        .chars()
        .next()
        .and_then(|ch| ch.to_digit(10))
        .and_then(|digit| u8::try_from(digit).ok())
        .filter(|code| CATEGORIES.iter().any(|(known, _)| known == code))
        .unwrap_or(UNKNOWN_CATEGORY)
}

/// Health program areas, in catalog column order.
pub const HEALTH_CATEGORIES: [&str; 10] = [
    "Health?",
    "FPRH",
    "HIV-AIDS",
    "Health - General",
    "Malaria",
    "MCH",
    "Nutrition",
    "Other Public Health Threats",
    "PIOET",
    "TB",
];

/// Lowercase description keyword and the health category it implies.
const HEALTH_KEYWORDS: [(&str, &str); 7] = [
    ("tuberculosis", "TB"),
    ("malaria", "Malaria"),
    ("hiv", "HIV-AIDS"),
    ("nutrition", "Nutrition"),
    ("health", "Health?"),
    ("maternal", "MCH"),
    ("reprod", "FPRH"),
];

/// Set of health categories attached to one award.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthTags([bool; HEALTH_CATEGORIES.len()]);

impl HealthTags {
    /// Tag `category`; returns false when it is not a known health category.
    pub fn insert(&mut self, category: &str) -> bool {
        match HEALTH_CATEGORIES.iter().position(|known| *known == category) {
            Some(idx) => {
                self.0[idx] = true;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, category: &str) -> bool {
        HEALTH_CATEGORIES
            .iter()
            .position(|known| *known == category)
            .is_some_and(|idx| self.0[idx])
    }

    pub fn is_empty(&self) -> bool {
        !self.0.contains(&true)
    }

    /// Tagged categories in catalog column order.
    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        HEALTH_CATEGORIES
            .iter()
            .zip(self.0)
            .filter_map(|(name, tagged)| tagged.then_some(*name))
    }

    /// Single-category label: the last tagged category in column order.
    pub fn primary(&self) -> Option<&'static str> {
        self.iter().last()
    }

    /// Tagged categories joined with `", "`.
    pub fn joined(&self) -> String {
        self.iter().collect::<Vec<_>>().join(", ")
    }
}

/// Add the health categories implied by keywords in `description`.
pub fn guess_health_tags(description: &str, tags: &mut HealthTags) {
    let lowered = description.to_lowercase();
    for (keyword, category) in HEALTH_KEYWORDS {
        if lowered.contains(keyword) {
            tags.insert(category);
        }
    }
}

/// Curated award-level health tags, one row per award with one flag column
/// per health category.
#[derive(Clone, Debug, Default)]
pub struct HealthCatalog {
    awards: BTreeMap<AwardKey, HealthTags>,
}

impl HealthCatalog {
    /// Load the catalog at `path`, returning `None` when the file does not exist.
    ///
    /// Rows without an award id are skipped. A flag cell counts as set unless it
    /// is blank or a false-like value (`false`, `0`, `no`, `nan`).
    pub fn load(path: &Path) -> Result<Option<Self>, SyncError> {
        if !path.exists() {
            return Ok(None);
        }
        let table = Table::read(path)?;
        let key_col = table.column(HEALTH_CATALOG_AWARD_ID).ok_or_else(|| {
            SyncError::MissingInput(format!(
                "health catalog {} has no '{HEALTH_CATALOG_AWARD_ID}' column",
                path.display()
            ))
        })?;
        let flag_cols: Vec<(&str, usize)> = HEALTH_CATEGORIES
            .iter()
            .filter_map(|name| table.column(name).map(|idx| (*name, idx)))
            .collect();
        let mut awards = BTreeMap::new();
        for row in &table.rows {
            let Some(key) = row.get(key_col).map(|key| key.trim()).filter(|key| !key.is_empty())
            else {
                continue;
            };
            let mut tags = HealthTags::default();
            for (name, idx) in &flag_cols {
                if row.get(*idx).is_some_and(|cell| is_flag_set(cell)) {
                    tags.insert(name);
                }
            }
            awards.insert(key.to_string(), tags);
        }
        Ok(Some(Self { awards }))
    }

    pub fn len(&self) -> usize {
        self.awards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.awards.is_empty()
    }

    pub fn get(&self, award_key: &str) -> Option<&HealthTags> {
        self.awards.get(award_key)
    }

    /// Catalog tags for `award_key`; awards outside the catalog are tagged from
    /// their description.
    pub fn tags_for(&self, award_key: &str, description: &str) -> HealthTags {
        if let Some(tags) = self.get(award_key) {
            return *tags;
        }
        let mut tags = HealthTags::default();
        guess_health_tags(description, &mut tags);
        tags
    }
}

fn is_flag_set(cell: &str) -> bool {
    let value = cell.trim().to_ascii_lowercase();
    !value.is_empty() && !HEALTH_FALSE_VALUES.contains(&value.as_str())
}
