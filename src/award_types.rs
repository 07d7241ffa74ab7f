//! Award-type enumeration and the static search tables keyed by it.
//!
//! The search endpoint formats results differently per award family, so each
//! variant carries its own type-code list and field projection. Both lookups
//! are exhaustive matches over a closed enum.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;
use crate::types::TypeCode;

/// Award family used to scope a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AwardType {
    /// Definitive contracts and purchase orders.
    Contract,
    /// Indefinite delivery vehicles.
    Idv,
    /// Direct and guaranteed loans.
    Loan,
    /// Block, formula, project, and cooperative agreement grants.
    Grant,
    /// Direct payments with or without unrestricted use.
    DirectPayments,
    /// Insurance and other financial assistance.
    Other,
}

const BASE_FIELDS: &[&str] = &[
    "generated_internal_id",
    "prime_award_recipient_id",
    "def_codes",
    "Award ID",
    "Recipient Name",
    "Recipient DUNS Number",
    "recipient_id",
    "Base Obligation Date",
    "Recipient Location",
    "Awarding Agency",
    "Awarding Agency Code",
    "Awarding Sub Agency",
    "Awarding Sub Agency Code",
    "Contract Award Type",
    "Award Type",
    "Funding Agency",
    "Funding Agency Code",
    "Funding Sub Agency",
    "Funding Sub Agency Code",
    "Description",
];

const CONTRACT_FIELDS: &[&str] = &[
    "Start Date",
    "End Date",
    "Award Amount",
    "Total Outlays",
];

const IDV_FIELDS: &[&str] = &[
    "Start Date",
    "Award Amount",
    "Total Outlays",
    "Last Date to Order",
    "NAICS",
    "PSC",
];

const LOAN_FIELDS: &[&str] = &[
    "Issued Date",
    "Loan Value",
    "Subsidy Cost",
    "SAI Number",
    "CFDA Number",
    "Assistance Listings",
    "primary_assistance_listing",
];

const ASSISTANCE_FIELDS: &[&str] = &[
    "Start Date",
    "End Date",
    "Award Amount",
    "Total Outlays",
    "SAI Number",
    "CFDA Number",
    "Assistance Listings",
    "primary_assistance_listing",
];

impl AwardType {
    /// Every award family in search order.
    pub const ALL: [AwardType; 6] = [
        AwardType::Contract,
        AwardType::Idv,
        AwardType::Loan,
        AwardType::Grant,
        AwardType::DirectPayments,
        AwardType::Other,
    ];

    /// Award-type codes accepted by the search endpoint for this family.
    pub fn type_codes(self) -> &'static [TypeCode] {
        match self {
            AwardType::Contract => &["A", "B", "C", "D"],
            AwardType::Idv => &[
                "IDV_A", "IDV_B", "IDV_B_A", "IDV_B_B", "IDV_B_C", "IDV_C", "IDV_D", "IDV_E",
            ],
            AwardType::Loan => &["07", "08"],
            AwardType::Grant => &["02", "03", "04", "05"],
            AwardType::DirectPayments => &["06", "10"],
            AwardType::Other => &["09", "11", "-1"],
        }
    }

    fn specific_fields(self) -> &'static [&'static str] {
        match self {
            AwardType::Contract => CONTRACT_FIELDS,
            AwardType::Idv => IDV_FIELDS,
            AwardType::Loan => LOAN_FIELDS,
            AwardType::Grant | AwardType::DirectPayments | AwardType::Other => ASSISTANCE_FIELDS,
        }
    }

    /// Field projection requested from the search endpoint, base fields first.
    ///
    /// Each field appears once.
    pub fn search_fields(self) -> Vec<&'static str> {
        BASE_FIELDS
            .iter()
            .chain(self.specific_fields())
            .copied()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Stable lowercase name used on the command line and in logs.
    pub fn name(self) -> &'static str {
        match self {
            AwardType::Contract => "contract",
            AwardType::Idv => "idv",
            AwardType::Loan => "loan",
            AwardType::Grant => "grant",
            AwardType::DirectPayments => "direct_payments",
            AwardType::Other => "other",
        }
    }
}

impl fmt::Display for AwardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AwardType {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        AwardType::ALL
            .into_iter()
            .find(|award_type| award_type.name() == normalized)
            .ok_or_else(|| SyncError::Configuration(format!("unknown award type '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn type_codes_do_not_overlap_between_families() {
        let mut seen = HashSet::new();
        for award_type in AwardType::ALL {
            for code in award_type.type_codes() {
                assert!(seen.insert(*code), "duplicate type code {code}");
            }
        }
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn search_fields_start_with_entity_id_and_keep_family_fields() {
        for award_type in AwardType::ALL {
            let fields = award_type.search_fields();
            assert_eq!(fields[0], "generated_internal_id");
            assert!(fields.len() > BASE_FIELDS.len());
        }
        assert!(AwardType::Idv.search_fields().contains(&"NAICS"));
        assert!(AwardType::Loan.search_fields().contains(&"Subsidy Cost"));
        assert!(!AwardType::Contract.search_fields().contains(&"Loan Value"));
    }

    #[test]
    fn search_fields_list_each_field_once() {
        for award_type in AwardType::ALL {
            let fields = award_type.search_fields();
            let unique: HashSet<&str> = fields.iter().copied().collect();
            assert_eq!(unique.len(), fields.len(), "{award_type} repeats a field");
        }
        for table in [CONTRACT_FIELDS, IDV_FIELDS, LOAN_FIELDS, ASSISTANCE_FIELDS] {
            assert!(table.iter().all(|field| !BASE_FIELDS.contains(field)));
        }
        assert!(AwardType::Contract.search_fields().contains(&"Contract Award Type"));
        assert!(AwardType::Grant.search_fields().contains(&"Award Type"));
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!(
            "Direct-Payments".parse::<AwardType>().unwrap(),
            AwardType::DirectPayments
        );
        assert_eq!("IDV".parse::<AwardType>().unwrap(), AwardType::Idv);
        assert!("bond".parse::<AwardType>().is_err());
        for award_type in AwardType::ALL {
            assert_eq!(award_type.to_string().parse::<AwardType>().unwrap(), award_type);
        }
    }
}
