/// Constants used by the remote API transport.
pub mod api {
    /// Default API host.
    pub const DEFAULT_API_BASE: &str = "https://api.usaspending.gov";
    /// Paged award search endpoint path.
    pub const SPENDING_BY_AWARD_PATH: &str = "/api/v2/search/spending_by_award/";
    /// Paged transaction search endpoint path.
    pub const SPENDING_BY_TRANSACTION_PATH: &str = "/api/v2/search/spending_by_transaction/";
    /// Per-award download job endpoint path.
    pub const AWARD_DOWNLOAD_PATH: &str = "/api/v2/download/contract";
    /// Agency object-class summary endpoint path (`{agency}` is substituted).
    pub const OBJECT_CLASS_PATH: &str = "/api/v2/agency/{agency}/object_class/";
    /// Fixed search page size.
    pub const PAGE_SIZE: u32 = 100;
    /// First page index used by the search endpoint.
    pub const FIRST_PAGE: u32 = 1;
    /// Response field carrying the long-form award identifier.
    pub const ENTITY_ID_FIELD: &str = "generated_internal_id";
    /// Response field carrying a transaction's unique identifier.
    pub const TRANSACTION_ID_FIELD: &str = "internal_id";
    /// HTTP statuses that indicate throttling or an overloaded upstream.
    pub const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];
}

/// Constants used by the download state machine and batch downloader.
pub mod download {
    /// Number of entities processed per chunk.
    pub const CHUNK_SIZE: usize = 10;
    /// Status poll attempts before a job is left pending for the next sweep.
    pub const MAX_POLL_ATTEMPTS: u32 = 30;
    /// Seconds between search pages.
    pub const PAGE_DELAY_SECS: u64 = 1;
    /// Seconds between status polls.
    pub const POLL_INTERVAL_SECS: u64 = 1;
    /// Seconds the whole batch pauses after a transient failure.
    pub const TRANSIENT_COOLDOWN_SECS: u64 = 300;
    /// Global HTTP timeout in seconds.
    pub const HTTP_TIMEOUT_SECS: u64 = 120;
    /// Longest single sleep between cancellation checks, in milliseconds.
    pub const SLEEP_SLICE_MS: u64 = 250;
    /// Status strings meaning the job has not started yet.
    pub const QUEUED_STATUSES: [&str; 2] = ["ready", "queued"];
    /// Status string for a running job.
    pub const RUNNING_STATUS: &str = "running";
    /// Status string for a completed job.
    pub const FINISHED_STATUS: &str = "finished";
}

/// Constants used by on-disk layout and persisted state.
pub mod files {
    /// Folder under the data root holding raw per-entity downloads.
    pub const DOWNLOADS_DIR: &str = "downloads";
    /// Award index file name (inside the summary folder).
    pub const AWARD_INDEX_FILE: &str = "awards_index.json";
    /// Build-timestamp map file name (inside the summary folder).
    pub const BUILD_TIMESTAMPS_FILE: &str = "build_timestamps.json";
    /// Category summary tree file name (inside the summary folder).
    pub const CATEGORY_SUMMARY_FILE: &str = "category_summary.json";
    /// Discrepancy report file name (inside the summary folder).
    pub const REPORT_FILE: &str = "discrepancy_report.txt";
    /// Prefix for per-entity pending-download files.
    pub const PENDING_PREFIX: &str = "pending_";
    /// Prefix for per-entity downloaded-timestamp files.
    pub const DOWNLOADED_PREFIX: &str = "downloaded_";
    /// Extension used for in-progress extraction folders.
    pub const PARTIAL_EXTENSION: &str = "part";
    /// Build-timestamp key for the award index.
    pub const AWARD_INDEX_ARTIFACT: &str = "awards_index";
    /// Build-timestamp key for the category summary.
    pub const CATEGORY_SUMMARY_ARTIFACT: &str = "category_summary";
    /// Combined transaction table file name (inside the summary folder).
    pub const COMBINED_TRANSACTIONS_FILE: &str = "combined_transactions.csv";
    /// Build-timestamp key for the combined transaction table.
    pub const TRANSACTIONS_ARTIFACT: &str = "combined_transactions";
    /// Folder under the data root holding curated category inputs.
    pub const CATEGORIES_DIR: &str = "categories";
    /// Curated award-level health catalog file name (inside the categories folder).
    pub const HEALTH_CATALOG_FILE: &str = "award_categories.csv";
}

/// Column names read from or added to the extracted award tables.
pub mod columns {
    /// Treasury account column in FederalAccountFunding tables.
    pub const TREASURY_ACCOUNT_SYMBOL: &str = "treasury_account_symbol";
    /// Multi-account column in TransactionHistory tables.
    pub const TRANSACTION_ACCOUNTS: &str = "treasury_accounts_funding_this_award";
    /// Multi-account column in Sub-Awards tables.
    pub const SUBAWARD_ACCOUNTS: &str = "prime_award_treasury_accounts_funding_this_award";
    /// Submission period (`FY2024P07`) in FederalAccountFunding tables.
    pub const SUBMISSION_PERIOD: &str = "submission_period";
    /// Object class code in FederalAccountFunding tables.
    pub const OBJECT_CLASS_CODE: &str = "object_class_code";
    /// Obligated amount in FederalAccountFunding tables.
    pub const OBLIGATED_AMOUNT: &str = "transaction_obligated_amount";
    /// Cumulative fiscal-year-to-date outlay in FederalAccountFunding tables.
    pub const CUMULATIVE_OUTLAY: &str = "gross_outlay_amount_FYB_to_period_end";
    /// Action date in TransactionHistory tables.
    pub const ACTION_DATE: &str = "action_date";
    /// Action date in Sub-Awards tables.
    pub const SUBAWARD_ACTION_DATE: &str = "subaward_action_date";
    /// Entity identifier column added to every combined table.
    pub const ENTITY_ID: &str = "generated_internal_id";
    /// Derived fiscal year column.
    pub const FISCAL_YEAR: &str = "fiscal_year";
    /// Derived fiscal period column.
    pub const FISCAL_PERIOD: &str = "fiscal_period";
    /// Derived category code column.
    pub const CATEGORY_CODE: &str = "category_code";
    /// Derived category title column.
    pub const CATEGORY_TITLE: &str = "category_title";
    /// Derived incremental outlay column.
    pub const INCREMENTAL_OUTLAY: &str = "incremental_outlay";
    /// Award key column in the health catalog and the transaction search.
    pub const HEALTH_CATALOG_AWARD_ID: &str = "Award ID";
    /// Flag cells read as unset in the health catalog (compared lowercase).
    pub const HEALTH_FALSE_VALUES: [&str; 5] = ["false", "0", "no", "n", "nan"];
    /// Transaction date, also the sort key of the combined transaction table.
    pub const TRANSACTION_ACTION_DATE: &str = "Action Date";
    /// Free-text transaction description used for keyword tagging.
    pub const TRANSACTION_DESCRIPTION: &str = "Transaction Description";
    /// Derived list of every health category tagged on a transaction's award.
    pub const HEALTH_CATEGORIES: &str = "health_categories";
    /// Derived single health category label.
    pub const HEALTH_CATEGORY: &str = "health_category";
}

/// Constants used by the transaction collector.
pub mod transactions {
    /// Field projection requested from the transaction search.
    pub const TRANSACTION_FIELDS: [&str; 23] = [
        "internal_id",
        "Action Date",
        "Action Type",
        "Assistance Listing",
        "Award ID",
        "Award Type",
        "Awarding Agency",
        "Awarding Sub Agency",
        "Funding Agency",
        "Funding Sub Agency",
        "Issued Date",
        "Last Date to Order",
        "Loan Value",
        "Mod",
        "NAICS",
        "PSC",
        "Primary Place of Performance",
        "Recipient Location",
        "Recipient Name",
        "Recipient UEI",
        "Subsidy Cost",
        "Transaction Amount",
        "Transaction Description",
    ];
    /// Server-side sort order for transaction pages.
    pub const TRANSACTION_SORT_ORDER: &str = "desc";
}

/// Constants used by the time-series normalizer.
pub mod normalize {
    /// Category code for unclassified spending.
    pub const UNKNOWN_CATEGORY: u8 = 0;
    /// Last fiscal period of a fiscal year.
    pub const FINAL_PERIOD: u8 = 12;
    /// First calendar month of a fiscal year (October).
    pub const FISCAL_YEAR_START_MONTH: u32 = 10;
}
