//! Debit/credit sign normalization and year import mode reconciliation.

use crate::numeric::clamp_noise;
use crate::schema::{ImportMode, RowAmounts, YearScope};

/// Puts a signed pair on the correct side with both values non-negative.
///
/// Expects at most one side populated; pairs with both sides populated are
/// collapsed by the row resolver first.
pub fn normalize_pair(debit: f64, credit: f64) -> (f64, f64) {
    let (debit, credit) = if debit < 0.0 && credit <= 0.0 {
        (0.0, debit.abs())
    } else if credit < 0.0 && debit <= 0.0 {
        (credit.abs(), 0.0)
    } else {
        (debit.abs(), credit.abs())
    };
    (clamp_noise(debit), clamp_noise(credit))
}

pub fn normalize_amounts(amounts: RowAmounts) -> RowAmounts {
    let mut normalized = RowAmounts::default();
    for scope in [YearScope::Current, YearScope::Previous] {
        let (debit, credit) = amounts.pair(scope);
        normalized.set_pair(scope, normalize_pair(debit, credit));
    }
    normalized
}

/// Applies the import mode to one row. When both year pairs are mapped the
/// mode is ignored and the amounts pass through unchanged.
pub fn reconcile_year_mode(amounts: RowAmounts, mode: ImportMode, both_years_mapped: bool) -> RowAmounts {
    if both_years_mapped {
        return amounts;
    }

    let (keep, other) = match mode {
        ImportMode::Auto => return amounts,
        ImportMode::CurrentOnly => (YearScope::Current, YearScope::Previous),
        ImportMode::PreviousOnly => (YearScope::Previous, YearScope::Current),
    };

    let mut reconciled = RowAmounts::default();
    let pair = if amounts.has_scope(keep) {
        amounts.pair(keep)
    } else {
        amounts.pair(other)
    };
    reconciled.set_pair(keep, pair);
    reconciled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pair() {
        assert_eq!(normalize_pair(-50.0, 0.0), (0.0, 50.0));
        assert_eq!(normalize_pair(0.0, -75.0), (75.0, 0.0));
        assert_eq!(normalize_pair(100.0, 0.0), (100.0, 0.0));
        assert_eq!(normalize_pair(0.0, 100.0), (0.0, 100.0));
        assert_eq!(normalize_pair(0.0, 0.0), (0.0, 0.0));
        assert_eq!(normalize_pair(0.004, -0.009), (0.0, 0.0));
        assert_eq!(normalize_pair(-1200.0, 0.0), (0.0, 1200.0));
    }

    fn amounts(debit: f64, credit: f64, previous_debit: f64, previous_credit: f64) -> RowAmounts {
        RowAmounts {
            debit,
            credit,
            previous_debit,
            previous_credit,
        }
    }

    #[test]
    fn test_normalize_amounts_per_scope() {
        let normalized = normalize_amounts(amounts(-10.0, 0.0, 0.0, -20.0));
        assert_eq!(normalized, amounts(0.0, 10.0, 20.0, 0.0));
    }

    #[test]
    fn test_current_only() {
        let row = amounts(0.0, 0.0, 40.0, 0.0);
        assert_eq!(reconcile_year_mode(row, ImportMode::CurrentOnly, false), amounts(40.0, 0.0, 0.0, 0.0));

        let row = amounts(5.0, 0.0, 40.0, 0.0);
        assert_eq!(reconcile_year_mode(row, ImportMode::CurrentOnly, false), amounts(5.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_previous_only() {
        let row = amounts(0.0, 30.0, 0.0, 0.0);
        assert_eq!(reconcile_year_mode(row, ImportMode::PreviousOnly, false), amounts(0.0, 0.0, 0.0, 30.0));
    }

    #[test]
    fn test_mode_ignored_when_both_years_mapped() {
        let row = amounts(1.0, 0.0, 2.0, 0.0);
        assert_eq!(reconcile_year_mode(row, ImportMode::PreviousOnly, true), row);
        assert_eq!(reconcile_year_mode(row, ImportMode::Auto, false), row);
    }

    #[test]
    fn test_current_only_is_idempotent() {
        let row = amounts(0.0, 0.0, 0.0, 12.5);
        let once = reconcile_year_mode(row, ImportMode::CurrentOnly, false);
        let twice = reconcile_year_mode(once, ImportMode::CurrentOnly, false);
        assert_eq!(once, twice);
    }
}
