//! Threshold evaluator — computes days remaining for each tracked expiry and
//! matches against the configured alert thresholds.
//!
//! Forward-looking only: already-expired records are excluded, this engine
//! handles warnings, not violations. Whole-day truncation, no partial-day
//! rounding. Output is deterministic for a given `as_of` and data set.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ordered set of non-negative "days remaining" trigger points.
#[derive(Debug, Clone)]
pub struct AlertThresholds(Vec<i64>);

impl AlertThresholds {
    /// Build from raw day counts; sorted ascending and deduplicated.
    pub fn new(days: &[u32]) -> Self {
        let mut values: Vec<i64> = days.iter().map(|d| *d as i64).collect();
        values.sort_unstable();
        values.dedup();
        Self(values)
    }

    pub fn contains(&self, days_remaining: i64) -> bool {
        self.0.binary_search(&days_remaining).is_ok()
    }

    pub fn values(&self) -> &[i64] {
        &self.0
    }
}

impl Default for AlertThresholds {
    /// Standard warning ladder: 30, 14, 7, 3, 1 days out.
    fn default() -> Self {
        Self::new(&[30, 14, 7, 3, 1])
    }
}

/// A certification expiry row from the roster source. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedExpiry {
    pub pilot_id: String,
    pub pilot_name: String,
    /// Check code, e.g. "PC" (proficiency check) or "LPC".
    pub check_code: String,
    pub category: String,
    pub expiry_date: NaiveDate,
}

/// An expiry that landed exactly on an alert threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAlert {
    pub pilot_id: String,
    pub pilot_name: String,
    pub check_code: String,
    pub category: String,
    pub expiry_date: NaiveDate,
    pub days_remaining: i64,
}

/// Evaluate all expiries against the threshold set as of a given date.
///
/// Output is sorted by (days_remaining, pilot_id, check_code) so repeated
/// evaluations over the same data yield the identical candidate list.
pub fn evaluate(
    as_of: NaiveDate,
    thresholds: &AlertThresholds,
    expiries: &[TrackedExpiry],
) -> Vec<CandidateAlert> {
    let mut candidates: Vec<CandidateAlert> = expiries
        .iter()
        .filter_map(|expiry| {
            let days_remaining = (expiry.expiry_date - as_of).num_days();
            if days_remaining < 0 || !thresholds.contains(days_remaining) {
                return None;
            }
            Some(CandidateAlert {
                pilot_id: expiry.pilot_id.clone(),
                pilot_name: expiry.pilot_name.clone(),
                check_code: expiry.check_code.clone(),
                category: expiry.category.clone(),
                expiry_date: expiry.expiry_date,
                days_remaining,
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        (a.days_remaining, &a.pilot_id, &a.check_code)
            .cmp(&(b.days_remaining, &b.pilot_id, &b.check_code))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn expiry(pilot_id: &str, days_out: i64, as_of: NaiveDate) -> TrackedExpiry {
        TrackedExpiry {
            pilot_id: pilot_id.to_string(),
            pilot_name: format!("Pilot {pilot_id}"),
            check_code: "PC".to_string(),
            category: "Flight Checks".to_string(),
            expiry_date: as_of + Duration::days(days_out),
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_exact_threshold_produces_one_candidate() {
        let thresholds = AlertThresholds::default();
        for t in thresholds.values().to_vec() {
            let rows = vec![expiry("P1", t, as_of())];
            let candidates = evaluate(as_of(), &thresholds, &rows);
            assert_eq!(candidates.len(), 1, "threshold {t} should fire once");
            assert_eq!(candidates[0].days_remaining, t);
        }
    }

    #[test]
    fn test_non_threshold_days_excluded() {
        let thresholds = AlertThresholds::default();
        let rows = vec![
            expiry("P1", 2, as_of()),
            expiry("P2", 8, as_of()),
            expiry("P3", 90, as_of()),
        ];
        assert!(evaluate(as_of(), &thresholds, &rows).is_empty());
    }

    #[test]
    fn test_expired_records_excluded() {
        // days_remaining would be -30 and 0; only a 0 threshold may fire
        let thresholds = AlertThresholds::new(&[0, 7]);
        let rows = vec![expiry("P1", -30, as_of()), expiry("P2", 0, as_of())];
        let candidates = evaluate(as_of(), &thresholds, &rows);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].pilot_id, "P2");
    }

    #[test]
    fn test_deterministic_order() {
        let thresholds = AlertThresholds::default();
        let rows = vec![
            expiry("P3", 7, as_of()),
            expiry("P1", 30, as_of()),
            expiry("P2", 7, as_of()),
        ];
        let first = evaluate(as_of(), &thresholds, &rows);
        let mut reversed = rows.clone();
        reversed.reverse();
        let second = evaluate(as_of(), &thresholds, &reversed);

        let ids: Vec<&str> = first.iter().map(|c| c.pilot_id.as_str()).collect();
        let ids2: Vec<&str> = second.iter().map(|c| c.pilot_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P3", "P1"]);
        assert_eq!(ids, ids2);
    }

    #[test]
    fn test_thresholds_dedup_and_sort() {
        let thresholds = AlertThresholds::new(&[7, 1, 7, 30]);
        assert_eq!(thresholds.values(), &[1, 7, 30]);
    }
}
