//! Cumulative-to-incremental outlay normalization.
//!
//! Funding rows report gross outlays as fiscal-year-to-date totals. Each
//! (fiscal year, category) group is turned into per-period increments: the
//! first period keeps its own value (zero baseline), later periods subtract
//! the previous period's total.
//!
//! Unknown-category reclassification heuristic: within a fiscal year, when
//! the unknown category (0) never reports the final period, its amounts are
//! treated as having been folded into another category later in the year.
//! They are added to the first other category seen that year, period by
//! period, and the unknown category disappears from the output. When the
//! unknown category does report the final period it stays independent.

use std::collections::{BTreeMap, BTreeSet};

use crate::constants::normalize::{FINAL_PERIOD, UNKNOWN_CATEGORY};

/// One cumulative outlay observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlayPoint {
    pub fiscal_year: i32,
    pub period: u8,
    pub category: u8,
    pub cumulative: f64,
}

/// A retained observation with its incremental outlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedPoint {
    /// Index of the input point this row came from.
    pub source: usize,
    pub fiscal_year: i32,
    pub period: u8,
    /// Category after reclassification.
    pub category: u8,
    /// Cumulative value after merging unknown-category amounts.
    pub cumulative: f64,
    pub incremental: f64,
}

/// Normalize one series (typically one award's funding rows).
///
/// Output keeps input order and omits points merged away by the unknown
/// category heuristic. When several points share a (year, category, period)
/// their totals are summed and the period's increment is attributed to the
/// first of them; the others carry zero.
pub fn normalize(points: &[OutlayPoint]) -> Vec<NormalizedPoint> {
    let mut working: Vec<Option<NormalizedPoint>> = points
        .iter()
        .enumerate()
        .map(|(source, point)| {
            Some(NormalizedPoint {
                source,
                fiscal_year: point.fiscal_year,
                period: point.period,
                category: point.category,
                cumulative: point.cumulative,
                incremental: 0.0,
            })
        })
        .collect();

    let years: BTreeSet<i32> = points.iter().map(|point| point.fiscal_year).collect();
    for year in years {
        merge_unknown_category(&mut working, year);
    }

    let mut groups: BTreeMap<(i32, u8), Vec<usize>> = BTreeMap::new();
    for (idx, point) in working.iter().enumerate() {
        if let Some(point) = point {
            groups
                .entry((point.fiscal_year, point.category))
                .or_default()
                .push(idx);
        }
    }
    for members in groups.values() {
        assign_increments(&mut working, members);
    }

    working.into_iter().flatten().collect()
}

/// Fold unknown-category amounts of `year` into the first other category seen.
fn merge_unknown_category(working: &mut [Option<NormalizedPoint>], year: i32) {
    let in_year = |point: &NormalizedPoint| point.fiscal_year == year;
    let unknown: Vec<usize> = working
        .iter()
        .enumerate()
        .filter_map(|(idx, point)| {
            point
                .filter(|p| in_year(p) && p.category == UNKNOWN_CATEGORY)
                .map(|_| idx)
        })
        .collect();
    if unknown.is_empty() {
        return;
    }
    let reports_final_period = unknown
        .iter()
        .filter_map(|idx| working[*idx])
        .any(|point| point.period == FINAL_PERIOD);
    if reports_final_period {
        return;
    }
    let Some(target) = working
        .iter()
        .flatten()
        .find(|point| in_year(point) && point.category != UNKNOWN_CATEGORY)
        .map(|point| point.category)
    else {
        return;
    };

    let mut unknown_by_period: BTreeMap<u8, (f64, Vec<usize>)> = BTreeMap::new();
    for idx in unknown {
        if let Some(point) = working[idx] {
            let entry = unknown_by_period.entry(point.period).or_default();
            entry.0 += point.cumulative;
            entry.1.push(idx);
        }
    }

    for (period, (amount, members)) in unknown_by_period {
        let target_row = working.iter().position(|point| {
            point.is_some_and(|p| in_year(&p) && p.category == target && p.period == period)
        });
        match target_row {
            Some(row) => {
                if let Some(point) = working[row].as_mut() {
                    point.cumulative += amount;
                }
                for idx in members {
                    working[idx] = None;
                }
            }
            None => {
                // No target row in this period: the first unknown row carries the amount.
                let mut members = members.into_iter();
                if let Some(first) = members.next()
                    && let Some(point) = working[first].as_mut()
                {
                    point.category = target;
                    point.cumulative = amount;
                }
                for idx in members {
                    working[idx] = None;
                }
            }
        }
    }
}

/// Compute increments for one (year, category) group.
fn assign_increments(working: &mut [Option<NormalizedPoint>], members: &[usize]) {
    let mut by_period: BTreeMap<u8, (f64, Vec<usize>)> = BTreeMap::new();
    for idx in members {
        if let Some(point) = working[*idx] {
            let entry = by_period.entry(point.period).or_default();
            entry.0 += point.cumulative;
            entry.1.push(*idx);
        }
    }
    let mut previous = 0.0;
    for (total, rows) in by_period.into_values() {
        let increment = total - previous;
        previous = total;
        for (position, idx) in rows.into_iter().enumerate() {
            if let Some(point) = working[idx].as_mut() {
                point.incremental = if position == 0 { increment } else { 0.0 };
            }
        }
    }
}

/// Parse a submission period such as `FY2024P07`, `FY24P7`, or `FY2024Q2`.
///
/// Quarterly submissions map to the quarter's last period.
pub fn parse_submission_period(value: &str) -> Option<(i32, u8)> {
    let upper = value.trim().to_ascii_uppercase();
    let rest = upper.strip_prefix("FY")?;
    let (year_part, period_part, quarterly) = if let Some((year, period)) = rest.split_once('P') {
        (year, period, false)
    } else {
        let (year, quarter) = rest.split_once('Q')?;
        (year, quarter, true)
    };
    let mut year = year_part.parse::<i32>().ok()?;
    if year_part.len() == 2 {
        year += 2000;
    }
    let raw = period_part.parse::<u8>().ok()?;
    let period = if quarterly {
        if !(1..=4).contains(&raw) {
            return None;
        }
        raw * 3
    } else {
        raw
    };
    (1..=FINAL_PERIOD).contains(&period).then_some((year, period))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(fiscal_year: i32, period: u8, category: u8, cumulative: f64) -> OutlayPoint {
        OutlayPoint {
            fiscal_year,
            period,
            category,
            cumulative,
        }
    }

    fn series(points: &[NormalizedPoint], category: u8) -> Vec<(u8, f64, f64)> {
        points
            .iter()
            .filter(|p| p.category == category)
            .map(|p| (p.period, p.cumulative, p.incremental))
            .collect()
    }

    #[test]
    fn cumulative_sequence_becomes_increments() {
        let input: Vec<OutlayPoint> = [10.0, 10.0, 25.0, 40.0]
            .iter()
            .enumerate()
            .map(|(idx, value)| point(2024, idx as u8 + 1, 2, *value))
            .collect();
        let out = normalize(&input);
        let increments: Vec<f64> = out.iter().map(|p| p.incremental).collect();
        assert_eq!(increments, vec![10.0, 0.0, 15.0, 15.0]);
    }

    #[test]
    fn groups_reset_per_year_and_category() {
        let input = vec![
            point(2024, 11, 1, 50.0),
            point(2024, 12, 1, 80.0),
            point(2025, 1, 1, 5.0),
            point(2024, 12, 2, 7.0),
        ];
        let out = normalize(&input);
        let increments: Vec<f64> = out.iter().map(|p| p.incremental).collect();
        assert_eq!(increments, vec![50.0, 30.0, 5.0, 7.0]);
        assert_eq!(out.iter().map(|p| p.source).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn unordered_periods_are_sorted_before_differencing() {
        let input = vec![point(2024, 3, 4, 30.0), point(2024, 1, 4, 10.0)];
        let out = normalize(&input);
        assert_eq!(out[0].incremental, 20.0);
        assert_eq!(out[1].incremental, 10.0);
    }

    #[test]
    fn unknown_category_without_final_period_merges_into_first_known() {
        let input = vec![
            point(2024, 1, 0, 5.0),
            point(2024, 2, 0, 5.0),
            point(2024, 1, 3, 20.0),
            point(2024, 2, 3, 30.0),
        ];
        let out = normalize(&input);
        assert!(series(&out, 0).is_empty());
        assert_eq!(series(&out, 3), vec![(1, 25.0, 25.0), (2, 35.0, 10.0)]);
    }

    #[test]
    fn unknown_category_with_final_period_stays_independent() {
        let input = vec![
            point(2024, 11, 0, 5.0),
            point(2024, 12, 0, 8.0),
            point(2024, 11, 3, 20.0),
            point(2024, 12, 3, 30.0),
        ];
        let out = normalize(&input);
        assert_eq!(series(&out, 0), vec![(11, 5.0, 5.0), (12, 8.0, 3.0)]);
        assert_eq!(series(&out, 3), vec![(11, 20.0, 20.0), (12, 30.0, 10.0)]);
    }

    #[test]
    fn merge_relabels_unknown_rows_in_periods_the_target_lacks() {
        let input = vec![
            point(2024, 1, 0, 4.0),
            point(2024, 2, 0, 6.0),
            point(2024, 2, 2, 10.0),
        ];
        let out = normalize(&input);
        assert!(series(&out, 0).is_empty());
        assert_eq!(series(&out, 2), vec![(1, 4.0, 4.0), (2, 16.0, 12.0)]);
    }

    #[test]
    fn merge_is_scoped_to_one_fiscal_year() {
        let input = vec![
            point(2023, 12, 0, 9.0),
            point(2024, 1, 0, 1.0),
            point(2024, 1, 1, 2.0),
            point(2023, 12, 1, 4.0),
        ];
        let out = normalize(&input);
        let fy23: Vec<_> = out.iter().filter(|p| p.fiscal_year == 2023).collect();
        assert_eq!(fy23.len(), 2);
        let fy24: Vec<_> = out.iter().filter(|p| p.fiscal_year == 2024).collect();
        assert_eq!(fy24.len(), 1);
        assert_eq!(fy24[0].cumulative, 3.0);
    }

    #[test]
    fn unknown_only_year_keeps_its_rows() {
        let input = vec![point(2024, 1, 0, 3.0), point(2024, 2, 0, 7.0)];
        let out = normalize(&input);
        assert_eq!(series(&out, 0), vec![(1, 3.0, 3.0), (2, 7.0, 4.0)]);
    }

    #[test]
    fn duplicate_period_rows_share_one_increment() {
        let input = vec![
            point(2024, 1, 2, 10.0),
            point(2024, 1, 2, 5.0),
            point(2024, 2, 2, 20.0),
            point(2024, 2, 2, 10.0),
        ];
        let out = normalize(&input);
        let increments: Vec<f64> = out.iter().map(|p| p.incremental).collect();
        assert_eq!(increments, vec![15.0, 0.0, 15.0, 0.0]);
    }

    #[test]
    fn parses_submission_period_variants() {
        assert_eq!(parse_submission_period("FY2024P07"), Some((2024, 7)));
        assert_eq!(parse_submission_period("fy24p12"), Some((2024, 12)));
        assert_eq!(parse_submission_period("FY2023Q2"), Some((2023, 6)));
        assert_eq!(parse_submission_period("FY2023Q5"), None);
        assert_eq!(parse_submission_period("FY2024P13"), None);
        assert_eq!(parse_submission_period("2024P01"), None);
        assert_eq!(parse_submission_period(""), None);
    }
}
