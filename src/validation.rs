//! Pre-commit validation.
//!
//! Structural errors block an import. Warnings never block but must be shown
//! before the user commits.

use crate::balancer::{check_balance, BalanceCheck, VarianceSeverity};
use crate::error::{Result, TrialBalanceError};
use crate::ingestion::{extract_rows, Extraction};
use crate::ledger::ImportedRow;
use crate::schema::{
    AmountField, ColumnMapping, ImportMode, ImportOptions, LedgerRow, MappingField, SheetFrame,
    YearScope,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralError {
    #[error("No data rows detected after header detection")]
    NoDataRows,

    #[error("Account column is not mapped")]
    AccountUnmapped,

    #[error("Neither a debit nor a credit column is mapped for the current year")]
    AmountColumnsUnmapped,

    #[error("{first} and {second} are both mapped to column {column}")]
    DuplicateColumn {
        first: MappingField,
        second: MappingField,
        column: usize,
    },

    #[error("{field} is mapped to column {column}, but the sheet only has {width} columns")]
    ColumnOutOfRange {
        field: MappingField,
        column: usize,
        width: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportWarning {
    /// Rows with amounts but no account name; they are not imported.
    BlankAccountWithAmounts { count: usize },
    /// Mapped amount cells that are not numbers; read as zero.
    InvalidNumbers { field: AmountField, count: usize },
    BalanceVariance {
        scope: YearScope,
        variance: f64,
        severity: VarianceSeverity,
    },
    /// Both year pairs are mapped, so the selected mode does nothing.
    ImportModeIgnored { mode: ImportMode },
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportWarning::BlankAccountWithAmounts { count } => write!(
                f,
                "{} row(s) have amounts but no account name and will be skipped",
                count
            ),
            ImportWarning::InvalidNumbers { field, count } => write!(
                f,
                "{} {} cell(s) could not be read as numbers and count as zero",
                count,
                field.mapping_field()
            ),
            ImportWarning::BalanceVariance {
                scope,
                variance,
                severity,
            } => {
                let year = match scope {
                    YearScope::Current => "Current",
                    YearScope::Previous => "Previous",
                };
                let kind = match severity {
                    VarianceSeverity::Balanced => "balanced",
                    VarianceSeverity::Rounding => "rounding difference",
                    VarianceSeverity::Minor => "minor imbalance",
                    VarianceSeverity::Imbalanced => "imbalance",
                };
                write!(
                    f,
                    "{} year debits and credits differ by {:.2} ({})",
                    year, variance, kind
                )
            }
            ImportWarning::ImportModeIgnored { mode } => write!(
                f,
                "Both years are mapped to columns, so import mode '{}' has no effect",
                mode
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<StructuralError>,
    pub warnings: Vec<ImportWarning>,
    pub rows_ready: usize,
    pub skipped_blank_accounts: usize,
    pub skipped_total_rows: usize,
    pub invalid_numbers: BTreeMap<AmountField, usize>,
    pub balance: Option<BalanceCheck>,
}

impl ValidationReport {
    pub fn is_blocking(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// The report itself when nothing blocks, otherwise the blocking errors.
    pub fn into_result(self) -> Result<Self> {
        if self.is_blocking() {
            Err(TrialBalanceError::ValidationFailed(self.errors))
        } else {
            Ok(self)
        }
    }
}

/// Structural problems of a mapping against a sheet.
pub fn validate_mapping(frame: &SheetFrame, mapping: &ColumnMapping) -> Vec<StructuralError> {
    let mut errors = Vec::new();

    if frame.rows.is_empty() {
        errors.push(StructuralError::NoDataRows);
    }
    if mapping.account.is_none() {
        errors.push(StructuralError::AccountUnmapped);
    }
    if !mapping.maps_scope(YearScope::Current) {
        errors.push(StructuralError::AmountColumnsUnmapped);
    }
    for (first, second, column) in mapping.duplicate_columns() {
        errors.push(StructuralError::DuplicateColumn {
            first,
            second,
            column,
        });
    }
    let width = frame.column_count();
    for (field, column) in mapping.assigned() {
        if column >= width {
            errors.push(StructuralError::ColumnOutOfRange {
                field,
                column,
                width,
            });
        }
    }

    errors
}

/// Warnings shared by the sheet and extraction paths.
pub(crate) fn batch_warnings(
    rows: &[ImportedRow],
    skipped_blank_accounts: usize,
    invalid_numbers: &BTreeMap<AmountField, usize>,
    mode_ignored: Option<ImportMode>,
    tolerance: f64,
) -> (Vec<ImportWarning>, BalanceCheck) {
    let mut warnings = Vec::new();

    if skipped_blank_accounts > 0 {
        warnings.push(ImportWarning::BlankAccountWithAmounts {
            count: skipped_blank_accounts,
        });
    }
    for (field, count) in invalid_numbers {
        warnings.push(ImportWarning::InvalidNumbers {
            field: *field,
            count: *count,
        });
    }

    let preview: Vec<LedgerRow> = rows
        .iter()
        .map(|r| LedgerRow::new(r.account.clone(), r.category, r.amounts))
        .collect();
    let balance = check_balance(&preview, tolerance);
    for year in balance.unbalanced() {
        warnings.push(ImportWarning::BalanceVariance {
            scope: year.scope,
            variance: year.variance,
            severity: year.severity,
        });
    }

    if let Some(mode) = mode_ignored {
        warnings.push(ImportWarning::ImportModeIgnored { mode });
    }

    for warning in &warnings {
        warn!("{}", warning);
    }
    (warnings, balance)
}

/// Previews an import without touching any ledger: structural errors,
/// row-level defects, balance variance and policy conflicts.
pub fn validate_import(frame: &SheetFrame, mapping: &ColumnMapping, options: &ImportOptions) -> ValidationReport {
    let errors = validate_mapping(frame, mapping);
    if !errors.is_empty() {
        return ValidationReport {
            errors,
            ..Default::default()
        };
    }

    let Extraction {
        rows,
        skipped_blank_accounts,
        skipped_total_rows,
        invalid_numbers,
    } = extract_rows(frame, mapping, options);

    let mode_ignored = (mapping.maps_both_years() && options.import_mode != ImportMode::Auto)
        .then_some(options.import_mode);
    let (warnings, balance) = batch_warnings(
        &rows,
        skipped_blank_accounts,
        &invalid_numbers,
        mode_ignored,
        options.balance_tolerance,
    );

    let errors = if rows.is_empty() {
        vec![StructuralError::NoDataRows]
    } else {
        Vec::new()
    };

    ValidationReport {
        errors,
        warnings,
        rows_ready: rows.len(),
        skipped_blank_accounts,
        skipped_total_rows,
        invalid_numbers,
        balance: Some(balance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CellValue;

    fn frame(headers: &[&str], rows: &[&[&str]]) -> SheetFrame {
        SheetFrame {
            sheet_names: vec!["TB".to_string()],
            active_sheet: "TB".to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| CellValue::from(*c)).collect())
                .collect(),
            header_row: Some(0),
        }
    }

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            account: Some(0),
            debit: Some(1),
            credit: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_structural_errors() {
        let empty = frame(&["Account", "Debit", "Credit"], &[]);
        let errors = validate_mapping(&empty, &ColumnMapping::default());
        assert!(errors.contains(&StructuralError::NoDataRows));
        assert!(errors.contains(&StructuralError::AccountUnmapped));
        assert!(errors.contains(&StructuralError::AmountColumnsUnmapped));

        let sheet = frame(&["Account", "Debit", "Credit"], &[&["Cash", "1", ""]]);
        let clash = ColumnMapping {
            account: Some(0),
            debit: Some(1),
            credit: Some(1),
            previous_debit: Some(7),
            ..Default::default()
        };
        let errors = validate_mapping(&sheet, &clash);
        assert!(errors.contains(&StructuralError::DuplicateColumn {
            first: MappingField::Debit,
            second: MappingField::Credit,
            column: 1,
        }));
        assert!(errors.contains(&StructuralError::ColumnOutOfRange {
            field: MappingField::PreviousDebit,
            column: 7,
            width: 3,
        }));
    }

    #[test]
    fn test_row_level_warnings_do_not_block() {
        let sheet = frame(
            &["Account", "Debit", "Credit"],
            &[
                &["Cash", "100", ""],
                &["", "25", ""],
                &["Capital", "", "abc"],
                &["Loan", "", "100"],
            ],
        );
        let report = validate_import(&sheet, &mapping(), &ImportOptions::default());
        assert!(!report.is_blocking());
        assert_eq!(report.rows_ready, 3);
        assert_eq!(report.skipped_blank_accounts, 1);
        assert_eq!(report.invalid_numbers.get(&AmountField::Credit), Some(&1));
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, ImportWarning::BlankAccountWithAmounts { count: 1 })));
        assert!(report.balance.as_ref().unwrap().current.is_balanced());
    }

    #[test]
    fn test_balance_variance_warning() {
        let sheet = frame(
            &["Account", "Debit", "Credit"],
            &[&["Cash", "100.05", ""], &["Capital", "", "100"]],
        );
        let report = validate_import(&sheet, &mapping(), &ImportOptions::default());
        let variance = report.warnings.iter().find_map(|w| match w {
            ImportWarning::BalanceVariance { severity, .. } => Some(*severity),
            _ => None,
        });
        assert_eq!(variance, Some(VarianceSeverity::Rounding));
    }

    #[test]
    fn test_mode_ignored_when_both_years_mapped() {
        let sheet = frame(
            &["Account", "Debit", "Credit", "PY Debit", "PY Credit"],
            &[&["Cash", "1", "", "1", ""], &["Capital", "", "1", "", "1"]],
        );
        let both = ColumnMapping {
            previous_debit: Some(3),
            previous_credit: Some(4),
            ..mapping()
        };
        let options = ImportOptions {
            import_mode: ImportMode::CurrentOnly,
            ..Default::default()
        };
        let report = validate_import(&sheet, &both, &options);
        assert!(report.warnings.contains(&ImportWarning::ImportModeIgnored {
            mode: ImportMode::CurrentOnly
        }));
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_into_result_blocks() {
        let report = validate_import(&frame(&["A"], &[]), &ColumnMapping::default(), &ImportOptions::default());
        assert!(matches!(
            report.into_result(),
            Err(TrialBalanceError::ValidationFailed(errors)) if errors.len() == 3
        ));
    }
}
