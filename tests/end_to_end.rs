mod common;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use common::{ManualClock, Script, ScriptedApi, SharedApi, TAS, start_time};
use spending_sync::constants::columns::{
    ENTITY_ID, HEALTH_CATEGORY, INCREMENTAL_OUTLAY, TRANSACTION_ACTION_DATE,
};
use spending_sync::table::Table;
use spending_sync::{
    AwardType, CancelFlag, CodeFilter, CombineOutcome, Pacing, SpendingSync, SyncConfig, TableTag,
};
use tempfile::tempdir;

fn config(root: &Path) -> SyncConfig {
    SyncConfig {
        data_root: root.to_path_buf(),
        summary_name: "fy24".to_string(),
        code_filter: CodeFilter::TreasuryAccounts(vec![TAS.to_string()]),
        award_types: vec![AwardType::Contract, AwardType::Grant],
        fiscal_years: (2024, 2024),
        pacing: Pacing::immediate(),
        ..SyncConfig::default()
    }
}

fn sync_over(config: SyncConfig, api: &Arc<ScriptedApi>, clock: &Arc<ManualClock>) -> SpendingSync {
    SpendingSync::new(
        config,
        Box::new(SharedApi(api.clone())),
        clock.clone(),
        CancelFlag::new(),
    )
    .unwrap()
}

#[test]
fn failed_award_is_left_out_of_combined_tables() {
    let temp = tempdir().unwrap();
    let api = ScriptedApi::new(&[
        ("AWD_A", Script::Finish { running_polls: 1 }),
        ("AWD_B", Script::Reject("award is not available for download".to_string())),
        ("AWD_C", Script::Finish { running_polls: 0 }),
    ]);
    let clock = ManualClock::new();
    let sync = sync_over(config(temp.path()), &api, &clock);

    let index = sync.search_awards().unwrap();
    assert_eq!(index.len(), 3);

    let report = sync.download_awards().unwrap();
    assert_eq!(report.finished, vec!["AWD_A".to_string(), "AWD_C".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "AWD_B");

    let combined = sync.combine_awards().unwrap();
    assert_eq!(
        combined,
        vec![
            (TableTag::FederalAccountFunding, CombineOutcome::Written(4)),
            (TableTag::TransactionHistory, CombineOutcome::Written(2)),
            (TableTag::SubAwards, CombineOutcome::Empty),
        ]
    );

    let funding =
        Table::read(&sync.layout().combined_table(TableTag::FederalAccountFunding)).unwrap();
    let entities: BTreeSet<&str> = funding
        .rows
        .iter()
        .filter_map(|row| funding.cell(row, ENTITY_ID))
        .collect();
    assert_eq!(entities, BTreeSet::from(["AWD_A", "AWD_C"]));
    let increments: Vec<&str> = funding
        .rows
        .iter()
        .filter_map(|row| funding.cell(row, INCREMENTAL_OUTLAY))
        .collect();
    assert_eq!(increments, vec!["10.00", "15.00", "10.00", "15.00"]);

    assert!(sync.refresh_summary().unwrap());
    let comparisons = sync.reconcile().unwrap().unwrap();
    assert!(!comparisons.is_empty());
    let text = fs::read_to_string(sync.layout().report()).unwrap();
    assert!(text.contains(
        "FY2024 total obligated: summary $250.00 combined $200.00 difference $50.00 gap 20.0%"
    ));
    assert!(text.contains(
        "FY2024 Contractual services and supplies gross outlay: summary $60.00 combined $50.00 difference $10.00 gap 16.7%"
    ));
    assert!(text.contains(
        "FY2024 Acquisition of assets obligated: summary $0.00 combined $0.00 difference $0.00 gap -"
    ));
}

#[test]
fn second_run_without_cutoff_makes_no_network_calls() {
    let temp = tempdir().unwrap();
    let api = ScriptedApi::new(&[
        ("AWD_A", Script::Finish { running_polls: 0 }),
        ("AWD_B", Script::Finish { running_polls: 2 }),
    ]);
    let clock = ManualClock::new();
    let sync = sync_over(config(temp.path()), &api, &clock);

    let first = sync.run_all().unwrap();
    assert_eq!(first.indexed, 2);
    assert_eq!(first.batch.finished.len(), 2);
    assert!(first.summary_refreshed);
    assert!(first.comparisons.is_some());
    let calls = api.calls();
    assert!(calls > 0);

    let second = sync.run_all().unwrap();
    assert_eq!(api.calls(), calls);
    assert_eq!(second.batch.skipped.len(), 2);
    assert!(second.batch.finished.is_empty());
    assert!(!second.summary_refreshed);
    assert!(
        second
            .combined
            .iter()
            .filter(|(tag, _)| *tag != TableTag::SubAwards)
            .all(|(_, outcome)| *outcome == CombineOutcome::Fresh)
    );
    assert_eq!(second.comparisons, first.comparisons);
}

#[test]
fn cutoff_after_last_build_refetches_everything() {
    let temp = tempdir().unwrap();
    let api = ScriptedApi::new(&[("AWD_A", Script::Finish { running_polls: 0 })]);
    let clock = ManualClock::new();
    sync_over(config(temp.path()), &api, &clock).run_all().unwrap();
    let calls = api.calls();

    let stale = SyncConfig {
        staleness_cutoff: Some(start_time() + ChronoDuration::days(1)),
        ..config(temp.path())
    };
    let rerun = sync_over(stale, &api, &clock).run_all().unwrap();
    assert!(api.calls() > calls);
    assert_eq!(rerun.batch.finished, vec!["AWD_A".to_string()]);
    assert!(rerun.summary_refreshed);
}

#[test]
fn transactions_are_collected_tagged_and_reused() {
    let temp = tempdir().unwrap();
    let api = ScriptedApi::new(&[
        ("AWD_A", Script::Finish { running_polls: 0 }),
        ("AWD_B", Script::Finish { running_polls: 0 }),
    ]);
    let clock = ManualClock::new();
    let sync = sync_over(config(temp.path()), &api, &clock);
    let catalog = sync.layout().health_catalog();
    fs::create_dir_all(catalog.parent().unwrap()).unwrap();
    fs::write(&catalog, "Award ID,TB,Malaria\nAWD_B-short,True,False\n").unwrap();

    // Page 1 has both awards, page 2 repeats AWD_A.
    assert_eq!(sync.collect_transactions().unwrap(), CombineOutcome::Written(4));
    assert_eq!(api.calls(), 2);

    let table = Table::read(&sync.layout().combined_transactions()).unwrap();
    let ids: Vec<&str> = table
        .rows
        .iter()
        .filter_map(|row| table.cell(row, "internal_id"))
        .collect();
    assert_eq!(ids, vec!["202411", "202401", "202412", "202402"]);
    let dates: Vec<&str> = table
        .rows
        .iter()
        .filter_map(|row| table.cell(row, TRANSACTION_ACTION_DATE))
        .collect();
    assert_eq!(dates, vec!["2023-11-19", "2023-11-20", "2023-12-19", "2023-12-20"]);
    let tags: Vec<&str> = table
        .rows
        .iter()
        .filter_map(|row| table.cell(row, HEALTH_CATEGORY))
        .collect();
    assert_eq!(tags, vec!["TB", "Malaria", "TB", "Malaria"]);
    assert_eq!(table.cell(&table.rows[0], "NAICS code"), Some("541"));
    assert_eq!(table.cell(&table.rows[0], "country_name"), Some("KENYA"));
    assert!(table.column("NAICS").is_none());

    assert_eq!(sync.collect_transactions().unwrap(), CombineOutcome::Fresh);
    assert_eq!(api.calls(), 2);
}

#[test]
fn combine_without_downloads_is_a_hard_failure() {
    let temp = tempdir().unwrap();
    let api = ScriptedApi::new(&[("AWD_A", Script::Finish { running_polls: 0 })]);
    let clock = ManualClock::new();
    let sync = sync_over(config(temp.path()), &api, &clock);
    sync.search_awards().unwrap();

    let err = sync.combine_awards().unwrap_err();
    assert!(matches!(err, spending_sync::SyncError::MissingInput(_)));
    assert_eq!(sync.reconcile().unwrap(), None);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let temp = tempdir().unwrap();
    let api = ScriptedApi::new(&[]);
    let clock = ManualClock::new();
    let empty = SyncConfig {
        code_filter: CodeFilter::TreasuryAccounts(Vec::new()),
        ..config(temp.path())
    };
    let result = SpendingSync::new(
        empty,
        Box::new(SharedApi(api.clone())),
        clock.clone(),
        CancelFlag::new(),
    );
    assert!(matches!(
        result.err(),
        Some(spending_sync::SyncError::Configuration(_))
    ));
}
