//! # Trial Balance Importer
//!
//! A library for importing inconsistently formatted trial balance exports
//! (CSV and Excel workbooks) into a normalized, year-scoped ledger.
//!
//! ## Core Concepts
//!
//! - **Header Detection**: finds the header row under title and metadata rows and
//!   flattens composite year / label / Debit-Credit headers into one string per column
//! - **Column Mapping**: guesses which columns hold the account, category and the
//!   current and previous year Debit/Credit pairs
//! - **Row Resolution**: picks the most plausible Debit/Credit pair per row when a
//!   sheet carries Closing, Trial and Opening columns side by side
//! - **Normalization**: every pair ends up non-negative with at most one side nonzero
//! - **Merge**: re-imports update existing accounts, duplicate lines become working
//!   notes, and the Totals row is always recomputed
//!
//! ## Example
//!
//! ```rust,ignore
//! use trial_balance_importer::*;
//!
//! let csv = "Account,Debit,Credit\nCash,10000,\nShare Capital,,10000\n";
//! let outcome = import_trial_balance(
//!     &Ledger::new(),
//!     "trial_balance.csv",
//!     csv.as_bytes(),
//!     &ImportOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(outcome.ledger.totals().debit, 10_000.0);
//! ```

pub mod balancer;
pub mod chart_of_accounts;
pub mod error;
pub mod header;
pub mod ingestion;
pub mod keywords;
pub mod ledger;
pub mod mapping;
pub mod normalizer;
pub mod numeric;
pub mod resolver;
pub mod schema;
pub mod utils;
pub mod validation;
pub mod workbook;

pub use balancer::{
    check_balance, verify_balance, BalanceCheck, TrialBalanceBalancer, VarianceSeverity,
    YearBalance,
};
pub use chart_of_accounts::{AccountAliases, AccountEntry, ChartOfAccounts};
pub use error::{Result, TrialBalanceError};
pub use header::{build_composite_headers, detect_header_row, frame_from_rows};
pub use ingestion::*;
pub use ledger::{ImportedRow, Ledger, MergeSummary};
pub use mapping::guess_mapping;
pub use normalizer::{normalize_amounts, normalize_pair, reconcile_year_mode};
pub use resolver::{resolve_row, RowResolver};
pub use schema::*;
pub use utils::*;
pub use validation::{validate_import, validate_mapping, ImportWarning, StructuralError, ValidationReport};
pub use workbook::{decode_bytes, DecodeGate, RawWorkbook};

use log::{debug, info};

pub struct TrialBalanceImporter;

impl TrialBalanceImporter {
    /// Decodes a file and builds the frame for the configured sheet.
    pub fn load(file_name: &str, bytes: &[u8], options: &ImportOptions) -> Result<SheetFrame> {
        let workbook = decode_bytes(file_name, bytes)?;
        workbook.build_frame(options.sheet_name.as_deref())
    }

    /// The guessed mapping and its validation report, without merging.
    pub fn preview(frame: &SheetFrame, options: &ImportOptions) -> (ColumnMapping, ValidationReport) {
        let mapping = guess_mapping(&frame.headers, &frame.rows);
        let report = validate_import(frame, &mapping, options);
        (mapping, report)
    }

    /// Decodes, maps, validates and merges a file in one step.
    pub fn import(
        ledger: &Ledger,
        file_name: &str,
        bytes: &[u8],
        options: &ImportOptions,
    ) -> Result<ImportOutcome> {
        let frame = Self::load(file_name, bytes, options)?;
        info!(
            "Importing '{}' from sheet '{}' ({} data rows)",
            file_name,
            frame.active_sheet,
            frame.rows.len()
        );

        let mapping = guess_mapping(&frame.headers, &frame.rows);
        debug!("Guessed mapping: {:?}", mapping);

        let outcome = import_frame(ledger, &frame, &mapping, options)?;
        info!(
            "Merged {} new and {} updated account(s); {} line(s) grouped into notes",
            outcome.summary.created, outcome.summary.updated, outcome.summary.grouped
        );
        Ok(outcome)
    }

    /// Like [`import`](Self::import), but fails when the merged ledger does not
    /// balance within `options.balance_tolerance`.
    pub fn import_with_verification(
        ledger: &Ledger,
        file_name: &str,
        bytes: &[u8],
        options: &ImportOptions,
    ) -> Result<ImportOutcome> {
        let outcome = Self::import(ledger, file_name, bytes, options)?;
        verify_balance(outcome.ledger.rows(), options.balance_tolerance)?;
        Ok(outcome)
    }
}

pub fn import_trial_balance(
    ledger: &Ledger,
    file_name: &str,
    bytes: &[u8],
    options: &ImportOptions,
) -> Result<ImportOutcome> {
    TrialBalanceImporter::import(ledger, file_name, bytes, options)
}

pub fn import_with_verification(
    ledger: &Ledger,
    file_name: &str,
    bytes: &[u8],
    options: &ImportOptions,
) -> Result<ImportOutcome> {
    TrialBalanceImporter::import_with_verification(ledger, file_name, bytes, options)
}
