// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification confidence score.
//!
//! The score is the basis for auto-approval thresholds, so it is computed in
//! integer hundredths: the same report always yields the same value, with no
//! dependence on binary floating-point rounding.

use crate::models::{CheckResult, VerificationReport};

/// Base score in hundredths for each overall result.
fn base_hundredths(result: CheckResult) -> u64 {
    match result {
        CheckResult::Clear => 90,
        CheckResult::Consider => 60,
        CheckResult::Unidentified => 30,
    }
}

/// Score a report in `[0, 1]`, rounded half-up to two decimals.
///
/// - No overall result: `0`
/// - Empty breakdown: the base score for the result
/// - Otherwise: the mean of the base score and the fraction of breakdown
///   categories that came back `CLEAR`
pub fn score(report: &VerificationReport) -> f64 {
    let Some(result) = report.result else {
        return 0.0;
    };
    let base = base_hundredths(result);

    let total = report.breakdown.len() as u64;
    if total == 0 {
        return base as f64 / 100.0;
    }
    let clear = report
        .breakdown
        .values()
        .filter(|entry| entry.result == CheckResult::Clear)
        .count() as u64;

    // (base/100 + clear/total) / 2 in hundredths is (base*total + 100*clear) / (2*total).
    let numerator = base * total + 100 * clear;
    let denominator = 2 * total;
    let hundredths = (2 * numerator + denominator) / (2 * denominator);
    hundredths as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::models::{category, BreakdownEntry, CheckStatus};

    fn report(result: Option<CheckResult>, entries: &[CheckResult]) -> VerificationReport {
        let breakdown: BTreeMap<String, BreakdownEntry> = entries
            .iter()
            .enumerate()
            .map(|(i, r)| (format!("category{i}"), BreakdownEntry::new(*r, json!({}))))
            .collect();
        VerificationReport {
            check_id: "chk_1".to_string(),
            applicant_id: None,
            status: CheckStatus::Complete,
            result,
            breakdown,
            completed_at: None,
        }
    }

    #[test]
    fn absent_result_scores_zero() {
        assert_eq!(score(&report(None, &[CheckResult::Clear])), 0.0);
    }

    #[test]
    fn empty_breakdown_uses_base_score() {
        assert_eq!(score(&report(Some(CheckResult::Clear), &[])), 0.90);
        assert_eq!(score(&report(Some(CheckResult::Consider), &[])), 0.60);
        assert_eq!(score(&report(Some(CheckResult::Unidentified), &[])), 0.30);
    }

    #[test]
    fn three_of_four_clear_rounds_half_up() {
        let r = report(
            Some(CheckResult::Clear),
            &[
                CheckResult::Clear,
                CheckResult::Clear,
                CheckResult::Clear,
                CheckResult::Consider,
            ],
        );
        assert_eq!(score(&r), 0.83);
    }

    #[test]
    fn all_clear_breakdown() {
        let mut r = report(Some(CheckResult::Clear), &[]);
        r.breakdown.insert(
            category::DOCUMENT_AUTHENTICITY.to_string(),
            BreakdownEntry::new(CheckResult::Clear, json!({"result": "clear"})),
        );
        assert_eq!(score(&r), 0.95);
    }

    #[test]
    fn thirds_round_to_nearest_hundredth() {
        // (0.60 + 1/3) / 2 = 0.4666..
        let r = report(
            Some(CheckResult::Consider),
            &[CheckResult::Clear, CheckResult::Consider, CheckResult::Unidentified],
        );
        assert_eq!(score(&r), 0.47);
    }

    fn any_result() -> impl Strategy<Value = CheckResult> {
        prop_oneof![
            Just(CheckResult::Clear),
            Just(CheckResult::Consider),
            Just(CheckResult::Unidentified),
        ]
    }

    proptest! {
        #[test]
        fn score_is_deterministic_and_bounded(
            result in proptest::option::of(any_result()),
            entries in proptest::collection::vec(any_result(), 0..12),
        ) {
            let r = report(result, &entries);
            let first = score(&r);
            prop_assert_eq!(first, score(&r.clone()));
            prop_assert!((0.0..=1.0).contains(&first));
            prop_assert_eq!((first * 100.0).round() / 100.0, first);
        }
    }
}
