use crate::error::{Result, TrialBalanceError};
use crate::schema::{LedgerRow, RowAmounts, YearScope};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Variances at or below this are treated as an exact balance.
pub const BALANCED_EPSILON: f64 = 0.005;

/// Variances above this are real imbalances, whatever the rounding tolerance.
pub const IMBALANCE_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceSeverity {
    Balanced,
    /// Within the rounding tolerance.
    Rounding,
    /// Above the tolerance but at most one currency unit.
    Minor,
    Imbalanced,
}

impl VarianceSeverity {
    pub fn classify(variance: f64, tolerance: f64) -> Self {
        let magnitude = variance.abs();
        if magnitude <= BALANCED_EPSILON {
            VarianceSeverity::Balanced
        } else if magnitude <= tolerance {
            VarianceSeverity::Rounding
        } else if magnitude <= IMBALANCE_THRESHOLD {
            VarianceSeverity::Minor
        } else {
            VarianceSeverity::Imbalanced
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearBalance {
    pub scope: YearScope,
    pub total_debit: f64,
    pub total_credit: f64,
    /// `total_debit - total_credit`.
    pub variance: f64,
    pub severity: VarianceSeverity,
}

impl YearBalance {
    pub fn is_balanced(&self) -> bool {
        self.severity == VarianceSeverity::Balanced
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub current: YearBalance,
    /// Present only when some row carries previous-year amounts.
    pub previous: Option<YearBalance>,
}

impl BalanceCheck {
    pub fn years(&self) -> impl Iterator<Item = &YearBalance> {
        std::iter::once(&self.current).chain(self.previous.iter())
    }

    /// Years whose variance should be shown to the user.
    pub fn unbalanced(&self) -> impl Iterator<Item = &YearBalance> {
        self.years().filter(|y| !y.is_balanced())
    }
}

pub struct TrialBalanceBalancer<'a> {
    rows: &'a [LedgerRow],
    tolerance: f64,
}

impl<'a> TrialBalanceBalancer<'a> {
    pub fn new(rows: &'a [LedgerRow], tolerance: f64) -> Self {
        Self { rows, tolerance }
    }

    fn sum(&self) -> RowAmounts {
        self.rows
            .iter()
            .filter(|r| !r.is_totals())
            .fold(RowAmounts::default(), |acc, r| acc + r.amounts())
    }

    fn year(&self, totals: &RowAmounts, scope: YearScope) -> YearBalance {
        let (total_debit, total_credit) = totals.pair(scope);
        let variance = total_debit - total_credit;
        YearBalance {
            scope,
            total_debit,
            total_credit,
            variance,
            severity: VarianceSeverity::classify(variance, self.tolerance),
        }
    }

    pub fn check(&self) -> BalanceCheck {
        let totals = self.sum();
        let has_previous = self
            .rows
            .iter()
            .any(|r| !r.is_totals() && r.amounts().has_scope(YearScope::Previous));

        let check = BalanceCheck {
            current: self.year(&totals, YearScope::Current),
            previous: has_previous.then(|| self.year(&totals, YearScope::Previous)),
        };

        for year in check.years() {
            if year.is_balanced() {
                debug!("{:?} year balances at {:.2}", year.scope, year.total_debit);
            } else {
                warn!(
                    "{:?} year is out of balance by {:.2} ({:?})",
                    year.scope, year.variance, year.severity
                );
            }
        }
        check
    }

    /// Fails on the first year whose variance exceeds the tolerance.
    pub fn verify(&self) -> Result<()> {
        let check = self.check();
        for year in check.years() {
            if year.variance.abs() > self.tolerance.max(BALANCED_EPSILON) {
                return Err(TrialBalanceError::BalanceViolation {
                    scope: year.scope,
                    debit: year.total_debit,
                    credit: year.total_credit,
                    difference: year.variance,
                });
            }
        }
        Ok(())
    }
}

pub fn check_balance(rows: &[LedgerRow], tolerance: f64) -> BalanceCheck {
    TrialBalanceBalancer::new(rows, tolerance).check()
}

pub fn verify_balance(rows: &[LedgerRow], tolerance: f64) -> Result<()> {
    TrialBalanceBalancer::new(rows, tolerance).verify()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(account: &str, debit: f64, credit: f64) -> LedgerRow {
        LedgerRow::new(
            account,
            None,
            RowAmounts {
                debit,
                credit,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(VarianceSeverity::classify(0.0, 0.1), VarianceSeverity::Balanced);
        assert_eq!(VarianceSeverity::classify(-0.05, 0.1), VarianceSeverity::Rounding);
        assert_eq!(VarianceSeverity::classify(0.5, 0.1), VarianceSeverity::Minor);
        assert_eq!(VarianceSeverity::classify(250.0, 0.1), VarianceSeverity::Imbalanced);
    }

    #[test]
    fn test_balanced_ledger() {
        let rows = vec![row("Cash", 10_000.0, 0.0), row("Capital", 0.0, 10_000.0)];
        let check = check_balance(&rows, 0.1);
        assert!(check.current.is_balanced());
        assert!(check.previous.is_none());
        assert_eq!(check.unbalanced().count(), 0);
        assert!(verify_balance(&rows, 0.1).is_ok());
    }

    #[test]
    fn test_imbalance_is_reported() {
        let rows = vec![
            row("Cash", 10_000.0, 0.0),
            row("Capital", 0.0, 9_000.0),
            row("Totals", 10_000.0, 9_000.0),
        ];
        let check = check_balance(&rows, 0.1);
        assert_eq!(check.current.variance, 1_000.0);
        assert_eq!(check.current.severity, VarianceSeverity::Imbalanced);

        let error = verify_balance(&rows, 0.1).unwrap_err();
        assert!(matches!(
            error,
            TrialBalanceError::BalanceViolation {
                scope: YearScope::Current,
                ..
            }
        ));
    }

    #[test]
    fn test_previous_year_checked_when_present() {
        let mut prior = row("Cash", 0.0, 0.0);
        prior.previous_debit = 500.0;
        let rows = vec![prior];
        let check = check_balance(&rows, 0.1);
        let previous = check.previous.unwrap();
        assert_eq!(previous.variance, 500.0);
        assert_eq!(check.unbalanced().count(), 1);
    }
}
