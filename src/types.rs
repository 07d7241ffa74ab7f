/// Long-form award identifier returned by the search API (stable across runs).
/// Example: `ASST_NON_72061521CA00007_7200`
pub type EntityId = String;
/// Short, human-readable award identifier.
/// Example: `72061521CA00007`
pub type AwardKey = String;
/// Treasury account symbol used as a code-class filter.
/// Example: `072-019-2024/2025-1031-000`
pub type TreasuryAccount = String;
/// Award-type code sent to the search endpoint.
/// Examples: `A`, `IDV_B_A`, `02`
pub type TypeCode = &'static str;
/// One award record as returned by the search API (field name -> value).
pub type AwardRecord = serde_json::Map<String, serde_json::Value>;
/// Remote URL string (status or file location).
/// Example: `https://api.usaspending.gov/api/v2/download/status?file_name=...`
pub type Location = String;
/// Logical artifact name used as the key of the build-timestamp map.
/// Examples: `awards_index`, `combined_FederalAccountFunding`
pub type ArtifactName = String;
/// Single CSV cell value.
pub type Cell = String;
