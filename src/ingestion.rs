use crate::error::{Result, TrialBalanceError};
use crate::ledger::{ImportedRow, Ledger, MergeSummary};
use crate::mapping::guess_mapping;
use crate::normalizer::{normalize_amounts, reconcile_year_mode};
use crate::resolver::{collapse_pair, RowResolver};
use crate::schema::{
    AmountField, Category, ColumnMapping, ExtractedRow, ImportMode, ImportOptions, RowAmounts,
    SheetFrame, YearScope,
};
use crate::utils::{clean_account_name, is_total_label};
use crate::validation::{batch_warnings, validate_import, ValidationReport};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rows ready for the merge engine plus the defects found on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub rows: Vec<ImportedRow>,
    pub skipped_blank_accounts: usize,
    pub skipped_total_rows: usize,
    pub invalid_numbers: BTreeMap<AmountField, usize>,
}

/// Runs every data row of a frame through the row resolver, the sign
/// normalizer and the year mode reconciler.
pub fn extract_rows(frame: &SheetFrame, mapping: &ColumnMapping, options: &ImportOptions) -> Extraction {
    let resolver = RowResolver::new(&frame.headers, mapping, options.dominant_side_policy);
    let both_years_mapped = mapping.maps_both_years();
    let mut extraction = Extraction::default();

    for (index, cells) in frame.rows.iter().enumerate() {
        let text = |column: Option<usize>| {
            column
                .and_then(|c| cells.get(c))
                .map(|cell| clean_account_name(&cell.display_text()))
                .unwrap_or_default()
        };
        let account = text(mapping.account);
        let resolved = resolver.resolve(cells);
        let amounts = reconcile_year_mode(
            normalize_amounts(resolved.amounts),
            options.import_mode,
            both_years_mapped,
        );

        if account.is_empty() {
            if !amounts.is_zero() {
                extraction.skipped_blank_accounts += 1;
                debug!("Row {} has amounts but no account name; skipped", index);
            }
            continue;
        }
        if is_total_label(&account) {
            extraction.skipped_total_rows += 1;
            continue;
        }

        for field in resolved.invalid_fields {
            *extraction.invalid_numbers.entry(field).or_insert(0) += 1;
        }

        let label = text(mapping.category);
        extraction.rows.push(ImportedRow::new(
            account,
            Category::from_label(&label),
            amounts,
        ));
    }

    info!(
        "Extracted {} row(s) from sheet '{}' ({} blank account(s), {} total row(s) skipped)",
        extraction.rows.len(),
        frame.active_sheet,
        extraction.skipped_blank_accounts,
        extraction.skipped_total_rows
    );
    extraction
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOutcome {
    pub ledger: Ledger,
    pub summary: MergeSummary,
    pub report: ValidationReport,
}

/// Validates, extracts and merges one sheet. Structural errors abort before
/// the ledger is touched.
pub fn import_frame(
    ledger: &Ledger,
    frame: &SheetFrame,
    mapping: &ColumnMapping,
    options: &ImportOptions,
) -> Result<ImportOutcome> {
    let report = validate_import(frame, mapping, options).into_result()?;
    let extraction = extract_rows(frame, mapping, options);
    let (ledger, summary) = ledger.upsert(&extraction.rows, options);
    Ok(ImportOutcome {
        ledger,
        summary,
        report,
    })
}

/// Merges rows returned by the document-extraction collaborator. Amounts are
/// trusted but still collapsed, sign-normalized and reconciled against the
/// import mode. Previous-year values anywhere in the batch count as both
/// years being mapped.
pub fn import_extracted_rows(ledger: &Ledger, rows: &[ExtractedRow], options: &ImportOptions) -> ImportOutcome {
    let both_years_mapped = rows
        .iter()
        .any(|r| r.previous_debit.is_some() || r.previous_credit.is_some());

    let mut imported = Vec::with_capacity(rows.len());
    let mut skipped_blank_accounts = 0;
    let mut skipped_total_rows = 0;

    for row in rows {
        let mut raw = RowAmounts::default();
        raw.set_pair(
            YearScope::Current,
            collapse_pair(row.debit, row.credit, options.dominant_side_policy),
        );
        raw.set_pair(
            YearScope::Previous,
            collapse_pair(
                row.previous_debit.unwrap_or(0.0),
                row.previous_credit.unwrap_or(0.0),
                options.dominant_side_policy,
            ),
        );
        let amounts = reconcile_year_mode(normalize_amounts(raw), options.import_mode, both_years_mapped);

        let account = clean_account_name(&row.account);
        if account.is_empty() {
            if !amounts.is_zero() {
                skipped_blank_accounts += 1;
            }
            continue;
        }
        if is_total_label(&account) {
            skipped_total_rows += 1;
            continue;
        }

        let category = row.category.as_deref().and_then(Category::from_label);
        imported.push(ImportedRow::new(account, category, amounts));
    }

    let mode_ignored = (both_years_mapped && options.import_mode != ImportMode::Auto)
        .then_some(options.import_mode);
    let (warnings, balance) = batch_warnings(
        &imported,
        skipped_blank_accounts,
        &BTreeMap::new(),
        mode_ignored,
        options.balance_tolerance,
    );

    let (ledger, summary) = ledger.upsert(&imported, options);
    ImportOutcome {
        ledger,
        summary,
        report: ValidationReport {
            errors: Vec::new(),
            warnings,
            rows_ready: imported.len(),
            skipped_blank_accounts,
            skipped_total_rows,
            invalid_numbers: BTreeMap::new(),
            balance: Some(balance),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    SheetLoaded,
    MappingGuessed,
    MappingConfirmed,
    Merged,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::SheetLoaded => "sheet loaded",
            SessionState::MappingGuessed => "awaiting mapping confirmation",
            SessionState::MappingConfirmed => "mapping confirmed",
            SessionState::Merged => "merged",
        };
        f.write_str(label)
    }
}

/// One import from sheet selection to merge:
/// `Idle -> SheetLoaded -> MappingGuessed -> MappingConfirmed -> Merged -> Idle`.
#[derive(Debug, Clone)]
pub struct ImportSession {
    state: SessionState,
    options: ImportOptions,
    frame: Option<SheetFrame>,
    mapping: Option<ColumnMapping>,
    report: Option<ValidationReport>,
}

impl ImportSession {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            state: SessionState::Idle,
            options,
            frame: None,
            mapping: None,
            report: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn frame(&self) -> Option<&SheetFrame> {
        self.frame.as_ref()
    }

    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.mapping.as_ref()
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    fn require(&self, action: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TrialBalanceError::InvalidTransition {
                action,
                state: self.state.to_string(),
            })
        }
    }

    /// Loads (or replaces) the sheet; any earlier mapping is discarded.
    pub fn load_sheet(&mut self, frame: SheetFrame) -> Result<()> {
        self.require(
            "load a sheet",
            &[
                SessionState::Idle,
                SessionState::SheetLoaded,
                SessionState::MappingGuessed,
                SessionState::MappingConfirmed,
            ],
        )?;
        self.options.sheet_name = Some(frame.active_sheet.clone());
        self.frame = Some(frame);
        self.mapping = None;
        self.report = None;
        self.state = SessionState::SheetLoaded;
        Ok(())
    }

    pub fn guess_mapping(&mut self) -> Result<&ColumnMapping> {
        self.require(
            "guess a mapping",
            &[SessionState::SheetLoaded, SessionState::MappingGuessed],
        )?;
        let frame = self.frame.as_ref().ok_or(TrialBalanceError::NoDataRows)?;
        let mapping = guess_mapping(&frame.headers, &frame.rows);
        self.report = None;
        self.state = SessionState::MappingGuessed;
        Ok(&*self.mapping.insert(mapping))
    }

    /// Replaces the mapping with a user edit. A confirmed mapping must be
    /// confirmed again.
    pub fn set_mapping(&mut self, mapping: ColumnMapping) -> Result<()> {
        self.require(
            "edit the mapping",
            &[SessionState::MappingGuessed, SessionState::MappingConfirmed],
        )?;
        self.mapping = Some(mapping);
        self.report = None;
        self.state = SessionState::MappingGuessed;
        Ok(())
    }

    pub fn set_import_mode(&mut self, mode: ImportMode) {
        self.options.import_mode = mode;
        if self.state == SessionState::MappingConfirmed {
            self.report = None;
            self.state = SessionState::MappingGuessed;
        }
    }

    /// Validates the mapping. Blocking errors keep the session where it is.
    pub fn confirm(&mut self) -> Result<&ValidationReport> {
        self.require("confirm the mapping", &[SessionState::MappingGuessed])?;
        let (Some(frame), Some(mapping)) = (self.frame.as_ref(), self.mapping.as_ref()) else {
            return Err(TrialBalanceError::AccountColumnUnmapped);
        };
        let report = validate_import(frame, mapping, &self.options).into_result()?;
        self.state = SessionState::MappingConfirmed;
        Ok(&*self.report.insert(report))
    }

    pub fn merge_into(&mut self, ledger: &Ledger) -> Result<ImportOutcome> {
        self.require("merge", &[SessionState::MappingConfirmed])?;
        let (Some(frame), Some(mapping)) = (self.frame.as_ref(), self.mapping.as_ref()) else {
            return Err(TrialBalanceError::AccountColumnUnmapped);
        };
        let outcome = import_frame(ledger, frame, mapping, &self.options)?;
        self.state = SessionState::Merged;
        Ok(outcome)
    }

    pub fn reset(&mut self) {
        self.frame = None;
        self.mapping = None;
        self.report = None;
        self.state = SessionState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CellValue;

    fn frame() -> SheetFrame {
        let rows: Vec<Vec<CellValue>> = [
            ["Bank", "(1,200.00)", ""],
            ["Capital", "", "(1,200.00)"],
            ["", "", ""],
            ["Total", "1,200.00", "1,200.00"],
        ]
        .iter()
        .map(|r| r.iter().map(|c| CellValue::from(*c)).collect())
        .collect();
        SheetFrame {
            sheet_names: vec!["TB".to_string()],
            active_sheet: "TB".to_string(),
            headers: vec!["Account".into(), "Debit".into(), "Credit".into()],
            rows,
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
    fn test_extract_rows_normalizes_signs() {
        let extraction = extract_rows(&frame(), &mapping(), &ImportOptions::default());
        assert_eq!(extraction.rows.len(), 2);
        assert_eq!(extraction.skipped_total_rows, 1);
        assert_eq!(extraction.skipped_blank_accounts, 0);

        let bank = &extraction.rows[0];
        assert_eq!((bank.amounts.debit, bank.amounts.credit), (0.0, 1200.0));
        let capital = &extraction.rows[1];
        assert_eq!((capital.amounts.debit, capital.amounts.credit), (1200.0, 0.0));
    }

    #[test]
    fn test_extract_rows_applies_previous_only() {
        let options = ImportOptions {
            import_mode: ImportMode::PreviousOnly,
            ..Default::default()
        };
        let extraction = extract_rows(&frame(), &mapping(), &options);
        let bank = &extraction.rows[0];
        assert_eq!(bank.amounts.credit, 0.0);
        assert_eq!(bank.amounts.previous_credit, 1200.0);
    }

    #[test]
    fn test_import_extracted_rows() {
        let rows = vec![
            ExtractedRow {
                account: "Sales".to_string(),
                category: Some("Revenue".to_string()),
                debit: -500.0,
                credit: 0.0,
                previous_debit: None,
                previous_credit: None,
            },
            ExtractedRow {
                account: "Cash".to_string(),
                category: None,
                debit: 500.0,
                credit: 0.0,
                previous_debit: None,
                previous_credit: None,
            },
        ];
        let outcome = import_extracted_rows(&Ledger::new(), &rows, &ImportOptions::default());
        let sales = outcome.ledger.row("Sales").unwrap();
        assert_eq!(sales.credit, 500.0);
        assert_eq!(sales.category, Some(Category::Income));
        assert_eq!(outcome.summary.created, 2);
        assert!(!outcome.report.has_warnings());
    }

    #[test]
    fn test_session_happy_path() {
        let mut session = ImportSession::new(ImportOptions::default());
        assert_eq!(session.state(), SessionState::Idle);

        session.load_sheet(frame()).unwrap();
        let guessed = session.guess_mapping().unwrap().clone();
        assert_eq!(guessed, mapping());
        assert_eq!(session.state(), SessionState::MappingGuessed);

        session.confirm().unwrap();
        assert_eq!(session.state(), SessionState::MappingConfirmed);

        let outcome = session.merge_into(&Ledger::new()).unwrap();
        assert_eq!(session.state(), SessionState::Merged);
        assert_eq!(outcome.ledger.len(), 2);

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_session_rejects_out_of_order_calls() {
        let mut session = ImportSession::new(ImportOptions::default());
        assert!(matches!(
            session.confirm(),
            Err(TrialBalanceError::InvalidTransition { .. })
        ));
        assert!(matches!(
            session.merge_into(&Ledger::new()),
            Err(TrialBalanceError::InvalidTransition { .. })
        ));

        session.load_sheet(frame()).unwrap();
        session.guess_mapping().unwrap();
        session
            .set_mapping(ColumnMapping {
                account: Some(0),
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            session.confirm(),
            Err(TrialBalanceError::ValidationFailed(_))
        ));
        assert_eq!(session.state(), SessionState::MappingGuessed);
    }
}
