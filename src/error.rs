use crate::schema::{MappingField, YearScope};
use crate::validation::StructuralError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrialBalanceError {
    #[error("No data rows detected after header detection")]
    NoDataRows,

    #[error("Account column is not mapped")]
    AccountColumnUnmapped,

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

    #[error("Import blocked by {} structural error(s)", .0.len())]
    ValidationFailed(Vec<StructuralError>),

    #[error(
        "{scope:?} year does not balance: debits {debit:.2}, credits {credit:.2}, difference {difference:.2}"
    )]
    BalanceViolation {
        scope: YearScope,
        debit: f64,
        credit: f64,
        difference: f64,
    },

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Workbook contains no sheets with data")]
    EmptyWorkbook,

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Workbook decode error: {0}")]
    Workbook(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Decode request {request_id} is stale (latest request is {latest})")]
    StaleDecode { request_id: u64, latest: u64 },

    #[error("Cannot {action} while the import session is {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("'{0}' is a reserved row and cannot be edited directly")]
    ReservedAccount(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Account name must not be blank")]
    BlankAccountName,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<StructuralError> for TrialBalanceError {
    fn from(error: StructuralError) -> Self {
        match error {
            StructuralError::NoDataRows => Self::NoDataRows,
            StructuralError::AccountUnmapped => Self::AccountColumnUnmapped,
            StructuralError::AmountColumnsUnmapped => Self::AmountColumnsUnmapped,
            StructuralError::DuplicateColumn {
                first,
                second,
                column,
            } => Self::DuplicateColumn {
                first,
                second,
                column,
            },
            StructuralError::ColumnOutOfRange {
                field,
                column,
                width,
            } => Self::ColumnOutOfRange {
                field,
                column,
                width,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, TrialBalanceError>;
