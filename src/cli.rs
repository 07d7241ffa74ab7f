//! Command-line runner for the `spending-sync` binary.

use std::error::Error;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum, error::ErrorKind};
use tracing::warn;

use crate::award_types::AwardType;
use crate::clock::CancelFlag;
use crate::config::{CodeFilter, SyncConfig};
use crate::constants::api::DEFAULT_API_BASE;
use crate::layout::DataLayout;
use crate::pipeline::SpendingSync;
use crate::reconcile::{format_usd, reconcile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CommandArg {
    /// Build the award index.
    Search,
    /// Download raw data for every indexed award.
    Download,
    /// Merge raw tables into the combined artifacts.
    Combine,
    /// Fetch the agency category summary.
    Summary,
    /// Collect the transaction search into one health-tagged table.
    Transactions,
    /// Write the discrepancy report.
    Reconcile,
    /// Every stage in order.
    All,
}

#[derive(Debug, Parser)]
#[command(
    name = "spending-sync",
    disable_help_subcommand = true,
    about = "Mirror award spending for treasury accounts and reconcile it",
    long_about = "Search awards funded by treasury accounts (or an explicit award id list), download per-award archives, combine the extracted tables, and reconcile them against the agency object-class summary.",
    after_help = "Set RUST_LOG=info to see per-award progress. Artifacts older than --cutoff are rebuilt; without it, existing artifacts are reused."
)]
struct SpendingSyncCli {
    #[arg(value_enum, help = "Stage to run")]
    command: CommandArg,
    #[arg(
        long = "tas",
        value_name = "TAS",
        conflicts_with = "award_ids",
        help = "Treasury account symbol to search, repeat as needed"
    )]
    treasury_accounts: Vec<String>,
    #[arg(
        long = "award-id",
        value_name = "ID",
        help = "Explicit award identifier, repeat as needed"
    )]
    award_ids: Vec<String>,
    #[arg(
        long = "award-type",
        value_name = "TYPE",
        value_parser = parse_award_type_arg,
        help = "Award family to search (contract, idv, loan, grant, direct_payments, other), repeat as needed; defaults to all"
    )]
    award_types: Vec<AwardType>,
    #[arg(
        long = "data-dir",
        value_name = "PATH",
        default_value = "data",
        help = "Root folder for downloads and derived artifacts"
    )]
    data_dir: PathBuf,
    #[arg(
        long,
        default_value = "awards",
        help = "Artifact set name; derived files live under <data-dir>/<name>"
    )]
    name: String,
    #[arg(
        long,
        value_name = "YYYY-MM-DD",
        value_parser = parse_cutoff_arg,
        help = "Rebuild artifacts recorded before this date"
    )]
    cutoff: Option<DateTime<Utc>>,
    #[arg(
        long = "fiscal-years",
        value_name = "FIRST..LAST",
        value_parser = parse_fiscal_years_arg,
        help = "Fiscal years covered by the category summary, e.g. 2022..2024"
    )]
    fiscal_years: Option<(i32, i32)>,
    #[arg(long, value_name = "CODE", help = "Agency toptier code for the category summary")]
    agency: Option<String>,
    #[arg(
        long = "stop-on-errors",
        help = "Abort the batch on the first non-transient failure"
    )]
    stop_on_errors: bool,
    #[arg(long = "api-base", value_name = "URL", default_value = DEFAULT_API_BASE)]
    api_base: String,
}

impl SpendingSyncCli {
    fn into_config(self) -> SyncConfig {
        let defaults = SyncConfig::default();
        let code_filter = if self.award_ids.is_empty() {
            CodeFilter::TreasuryAccounts(self.treasury_accounts)
        } else {
            CodeFilter::AwardIds(self.award_ids)
        };
        SyncConfig {
            api_base: self.api_base,
            data_root: self.data_dir,
            summary_name: self.name,
            code_filter,
            award_types: if self.award_types.is_empty() {
                defaults.award_types.clone()
            } else {
                self.award_types
            },
            fiscal_years: self.fiscal_years.unwrap_or(defaults.fiscal_years),
            agency_code: self.agency.unwrap_or(defaults.agency_code.clone()),
            staleness_cutoff: self.cutoff,
            stop_on_errors: self.stop_on_errors,
            ..defaults
        }
    }
}

/// Parse `args_iter` (without the program name) and run the selected stage.
pub fn run_spending_sync<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<SpendingSyncCli, _>(std::iter::once("spending-sync".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };
    let command = cli.command;
    let config = cli.into_config();

    // Reporting reads only local artifacts; it needs no search scope.
    if command == CommandArg::Reconcile {
        let layout = DataLayout::new(&config.data_root, &config.summary_name);
        print_comparisons(&layout, reconcile(&layout)?);
        return Ok(());
    }

    let sync = SpendingSync::from_config(config, interrupt_flag())?;
    match command {
        CommandArg::Search => {
            let index = sync.search_awards()?;
            println!("indexed awards: {}", index.len());
            println!("index: {}", sync.layout().award_index().display());
        }
        CommandArg::Download => {
            let report = sync.download_awards()?;
            println!(
                "finished: {}  skipped: {}  failed: {}  errored: {}  sweeps: {}",
                report.finished.len(),
                report.skipped.len(),
                report.failed.len(),
                report.errored.len(),
                report.sweeps
            );
            for (entity_id, reason) in report.failed.iter().chain(&report.errored) {
                println!("  {entity_id}: {reason}");
            }
        }
        CommandArg::Combine => {
            for (tag, outcome) in sync.combine_awards()? {
                println!("{tag}: {outcome:?}");
            }
        }
        CommandArg::Summary => {
            let refreshed = sync.refresh_summary()?;
            println!(
                "category summary {}",
                if refreshed { "refreshed" } else { "is fresh" }
            );
        }
        CommandArg::Transactions => {
            let outcome = sync.collect_transactions()?;
            println!("transactions: {outcome:?}");
            println!("table: {}", sync.layout().combined_transactions().display());
        }
        CommandArg::All => {
            let summary = sync.run_all()?;
            println!("indexed awards: {}", summary.indexed);
            println!(
                "finished: {}  skipped: {}  failed: {}  errored: {}",
                summary.batch.finished.len(),
                summary.batch.skipped.len(),
                summary.batch.failed.len(),
                summary.batch.errored.len()
            );
            for (tag, outcome) in &summary.combined {
                println!("{tag}: {outcome:?}");
            }
            match summary.comparisons {
                Some(count) => println!(
                    "report: {} ({count} lines)",
                    sync.layout().report().display()
                ),
                None => println!("report: not produced"),
            }
        }
        CommandArg::Reconcile => {}
    }
    Ok(())
}

/// Process-wide flag raised by Ctrl-C.
///
/// The handler is installed on first use. Stages observe the flag at their
/// next checkpoint or sleep slice and unwind with `SyncError::Cancelled`.
fn interrupt_flag() -> CancelFlag {
    static INTERRUPT: OnceLock<CancelFlag> = OnceLock::new();
    INTERRUPT
        .get_or_init(|| {
            let cancel = CancelFlag::new();
            let raised = cancel.clone();
            let installed = ctrlc::set_handler(move || {
                eprintln!("\n[spending_sync] interrupt received; stopping at the next checkpoint");
                raised.cancel();
            });
            if let Err(err) = installed {
                warn!("[spending_sync:cli] could not install the Ctrl-C handler: {err}");
            }
            cancel
        })
        .clone()
}

fn print_comparisons(
    layout: &DataLayout,
    comparisons: Option<Vec<crate::reconcile::Comparison>>,
) {
    let Some(comparisons) = comparisons else {
        println!("report not produced: category summary or combined table missing");
        return;
    };
    let largest = comparisons
        .iter()
        .map(|comparison| comparison.difference())
        .fold(0.0, f64::max);
    println!("report: {}", layout.report().display());
    println!("comparisons: {}", comparisons.len());
    println!("largest difference: {}", format_usd(largest));
}

fn parse_award_type_arg(raw: &str) -> Result<AwardType, String> {
    raw.parse::<AwardType>().map_err(|err| err.to_string())
}

fn parse_cutoff_arg(raw: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Could not parse --cutoff value '{raw}' as YYYY-MM-DD"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("--cutoff value '{raw}' is out of range"))
}

fn parse_fiscal_years_arg(raw: &str) -> Result<(i32, i32), String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<i32>()
            .map_err(|_| format!("Could not parse fiscal year '{part}' in '{raw}'"))
    };
    match raw.split_once("..") {
        Some((first, last)) => Ok((parse(first)?, parse(last)?)),
        None => {
            let year = parse(raw)?;
            Ok((year, year))
        }
    }
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(args: &[&str]) -> Result<SpendingSyncCli, clap::Error> {
        SpendingSyncCli::try_parse_from(std::iter::once("spending-sync").chain(args.iter().copied()))
    }

    #[test]
    fn builds_config_from_flags() {
        let cli = parse(&[
            "download",
            "--tas",
            "072-019-2024/2025-1031-000",
            "--tas",
            "072-019-2023/2024-1031-000",
            "--award-type",
            "grant",
            "--cutoff",
            "2025-03-01",
            "--fiscal-years",
            "2023..2024",
            "--stop-on-errors",
        ])
        .unwrap();
        assert_eq!(cli.command, CommandArg::Download);
        let config = cli.into_config();
        assert_eq!(config.code_filter.treasury_accounts().len(), 2);
        assert_eq!(config.award_types, vec![AwardType::Grant]);
        assert_eq!(
            config.staleness_cutoff,
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(config.fiscal_years, (2023, 2024));
        assert!(config.stop_on_errors);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn award_ids_select_the_id_filter() {
        let config = parse(&["all", "--award-id", "CONT_AWD_1", "--name", "ids"])
            .unwrap()
            .into_config();
        assert_eq!(
            config.code_filter,
            CodeFilter::AwardIds(vec!["CONT_AWD_1".to_string()])
        );
        assert_eq!(config.summary_name, "ids");
        assert_eq!(config.award_types.len(), AwardType::ALL.len());
    }

    #[test]
    fn tas_and_award_id_conflict() {
        let err = parse(&["search", "--tas", "A", "--award-id", "B"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["search", "--cutoff", "03/01/2025"]).is_err());
        assert!(parse(&["search", "--award-type", "bond"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert_eq!(
            parse(&["transactions", "--tas", "A"]).unwrap().command,
            CommandArg::Transactions
        );
    }

    #[test]
    fn fiscal_year_argument_forms() {
        assert_eq!(parse_fiscal_years_arg("2024"), Ok((2024, 2024)));
        assert_eq!(parse_fiscal_years_arg("2021..2024"), Ok((2021, 2024)));
        assert!(parse_fiscal_years_arg("2021..x").is_err());
    }

    #[test]
    fn interrupt_flag_is_installed_once_and_starts_lowered() {
        let first = interrupt_flag();
        let second = interrupt_flag();
        assert!(!first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[test]
    fn help_is_not_an_error() {
        let parsed =
            parse_cli::<SpendingSyncCli, _>(["spending-sync".to_string(), "--help".to_string()])
                .unwrap();
        assert!(parsed.is_none());
    }
}
