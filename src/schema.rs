use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Account name of the synthetic row that carries column totals.
pub const TOTALS_ACCOUNT: &str = "Totals";

/// Description prefix of working notes generated from duplicate import lines.
/// Notes carrying it are cleared and regenerated on the next import.
pub const AUTO_GROUP_PREFIX: &str = "[Auto-grouped]";

/// A single spreadsheet cell as delivered by the decoder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text rendering used by header scoring and account extraction.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Category {
    #[schemars(description = "Resources owned by the business (debit balance)")]
    Assets,
    #[schemars(description = "Obligations owed to creditors (credit balance)")]
    Liabilities,
    #[schemars(description = "Owner's residual interest: capital, reserves, retained earnings")]
    Equity,
    #[schemars(description = "Revenue and other income (credit balance)")]
    Income,
    #[schemars(description = "Cost of sales and operating expenses (debit balance)")]
    Expenses,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Category::Assets => "Assets",
            Category::Liabilities => "Liabilities",
            Category::Equity => "Equity",
            Category::Income => "Income",
            Category::Expenses => "Expenses",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum YearScope {
    Current,
    Previous,
}

/// Policy for assigning single-year source data to a year slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    #[default]
    Auto,
    CurrentOnly,
    PreviousOnly,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ImportMode::Auto => "auto",
            ImportMode::CurrentOnly => "current_only",
            ImportMode::PreviousOnly => "previous_only",
        };
        f.write_str(label)
    }
}

/// What happens to a resolved pair that still has both sides populated.
///
/// `KeepLarger` discards the smaller side. This mirrors how trial balance
/// exports have historically been read, but it does drop data; `Net` keeps the
/// difference on the dominant side instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DominantSidePolicy {
    #[default]
    KeepLarger,
    Net,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AmountField {
    Debit,
    Credit,
    PreviousDebit,
    PreviousCredit,
}

impl AmountField {
    pub const ALL: [AmountField; 4] = [
        AmountField::Debit,
        AmountField::Credit,
        AmountField::PreviousDebit,
        AmountField::PreviousCredit,
    ];

    pub fn mapping_field(self) -> MappingField {
        match self {
            AmountField::Debit => MappingField::Debit,
            AmountField::Credit => MappingField::Credit,
            AmountField::PreviousDebit => MappingField::PreviousDebit,
            AmountField::PreviousCredit => MappingField::PreviousCredit,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MappingField {
    Account,
    Category,
    Debit,
    Credit,
    PreviousDebit,
    PreviousCredit,
}

impl MappingField {
    pub const ALL: [MappingField; 6] = [
        MappingField::Account,
        MappingField::Category,
        MappingField::Debit,
        MappingField::Credit,
        MappingField::PreviousDebit,
        MappingField::PreviousCredit,
    ];
}

impl fmt::Display for MappingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MappingField::Account => "Account",
            MappingField::Category => "Category",
            MappingField::Debit => "Debit",
            MappingField::Credit => "Credit",
            MappingField::PreviousDebit => "Previous Debit",
            MappingField::PreviousCredit => "Previous Credit",
        };
        f.write_str(label)
    }
}

/// The four amounts of a ledger line, current year first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RowAmounts {
    pub debit: f64,
    pub credit: f64,
    pub previous_debit: f64,
    pub previous_credit: f64,
}

impl RowAmounts {
    pub fn get(&self, field: AmountField) -> f64 {
        match field {
            AmountField::Debit => self.debit,
            AmountField::Credit => self.credit,
            AmountField::PreviousDebit => self.previous_debit,
            AmountField::PreviousCredit => self.previous_credit,
        }
    }

    pub fn set(&mut self, field: AmountField, value: f64) {
        match field {
            AmountField::Debit => self.debit = value,
            AmountField::Credit => self.credit = value,
            AmountField::PreviousDebit => self.previous_debit = value,
            AmountField::PreviousCredit => self.previous_credit = value,
        }
    }

    pub fn pair(&self, scope: YearScope) -> (f64, f64) {
        match scope {
            YearScope::Current => (self.debit, self.credit),
            YearScope::Previous => (self.previous_debit, self.previous_credit),
        }
    }

    pub fn set_pair(&mut self, scope: YearScope, (debit, credit): (f64, f64)) {
        match scope {
            YearScope::Current => {
                self.debit = debit;
                self.credit = credit;
            }
            YearScope::Previous => {
                self.previous_debit = debit;
                self.previous_credit = credit;
            }
        }
    }

    pub fn has_scope(&self, scope: YearScope) -> bool {
        let (debit, credit) = self.pair(scope);
        debit.abs() > crate::numeric::NOISE_FLOOR || credit.abs() > crate::numeric::NOISE_FLOOR
    }

    pub fn is_zero(&self) -> bool {
        !self.has_scope(YearScope::Current) && !self.has_scope(YearScope::Previous)
    }
}

impl std::ops::Add for RowAmounts {
    type Output = RowAmounts;

    fn add(self, other: RowAmounts) -> RowAmounts {
        RowAmounts {
            debit: self.debit + other.debit,
            credit: self.credit + other.credit,
            previous_debit: self.previous_debit + other.previous_debit,
            previous_credit: self.previous_credit + other.previous_credit,
        }
    }
}

impl std::ops::Sub for RowAmounts {
    type Output = RowAmounts;

    fn sub(self, other: RowAmounts) -> RowAmounts {
        RowAmounts {
            debit: self.debit - other.debit,
            credit: self.credit - other.credit,
            previous_debit: self.previous_debit - other.previous_debit,
            previous_credit: self.previous_credit - other.previous_credit,
        }
    }
}

/// One trial balance line. The `debit`..`previous_credit` fields are the
/// displayed amounts; the `base_*` fields are present once working notes have
/// been applied and then satisfy `displayed = base + note totals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub account: String,
    pub category: Option<Category>,
    pub debit: f64,
    pub credit: f64,
    pub previous_debit: f64,
    pub previous_credit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_debit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_credit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_previous_debit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_previous_credit: Option<f64>,
}

impl LedgerRow {
    pub fn new(account: impl Into<String>, category: Option<Category>, amounts: RowAmounts) -> Self {
        Self {
            account: account.into(),
            category,
            debit: amounts.debit,
            credit: amounts.credit,
            previous_debit: amounts.previous_debit,
            previous_credit: amounts.previous_credit,
            base_debit: None,
            base_credit: None,
            base_previous_debit: None,
            base_previous_credit: None,
        }
    }

    pub fn is_totals(&self) -> bool {
        self.account == TOTALS_ACCOUNT
    }

    pub fn amounts(&self) -> RowAmounts {
        RowAmounts {
            debit: self.debit,
            credit: self.credit,
            previous_debit: self.previous_debit,
            previous_credit: self.previous_credit,
        }
    }

    pub fn set_amounts(&mut self, amounts: RowAmounts) {
        self.debit = amounts.debit;
        self.credit = amounts.credit;
        self.previous_debit = amounts.previous_debit;
        self.previous_credit = amounts.previous_credit;
    }

    pub fn has_base(&self) -> bool {
        self.base_debit.is_some()
            || self.base_credit.is_some()
            || self.base_previous_debit.is_some()
            || self.base_previous_credit.is_some()
    }

    /// Base amounts, or `None` when the row has never had notes applied.
    pub fn base(&self) -> Option<RowAmounts> {
        if !self.has_base() {
            return None;
        }
        Some(RowAmounts {
            debit: self.base_debit.unwrap_or(0.0),
            credit: self.base_credit.unwrap_or(0.0),
            previous_debit: self.base_previous_debit.unwrap_or(0.0),
            previous_credit: self.base_previous_credit.unwrap_or(0.0),
        })
    }

    pub fn set_base(&mut self, base: RowAmounts) {
        self.base_debit = Some(base.debit);
        self.base_credit = Some(base.credit);
        self.base_previous_debit = Some(base.previous_debit);
        self.base_previous_credit = Some(base.previous_credit);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingNote {
    pub description: String,
    pub debit: f64,
    pub credit: f64,
    pub year_scope: YearScope,
}

impl WorkingNote {
    pub fn new(description: impl Into<String>, debit: f64, credit: f64, year_scope: YearScope) -> Self {
        Self {
            description: description.into(),
            debit,
            credit,
            year_scope,
        }
    }

    pub fn is_auto_grouped(&self) -> bool {
        self.description.starts_with(AUTO_GROUP_PREFIX)
    }
}

/// Working notes keyed by the owning account's display name.
pub type NotesMap = BTreeMap<String, Vec<WorkingNote>>;

/// Column index assigned to each logical field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub account: Option<usize>,
    pub category: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub previous_debit: Option<usize>,
    pub previous_credit: Option<usize>,
}

impl ColumnMapping {
    pub fn get(&self, field: MappingField) -> Option<usize> {
        match field {
            MappingField::Account => self.account,
            MappingField::Category => self.category,
            MappingField::Debit => self.debit,
            MappingField::Credit => self.credit,
            MappingField::PreviousDebit => self.previous_debit,
            MappingField::PreviousCredit => self.previous_credit,
        }
    }

    pub fn set(&mut self, field: MappingField, column: Option<usize>) {
        match field {
            MappingField::Account => self.account = column,
            MappingField::Category => self.category = column,
            MappingField::Debit => self.debit = column,
            MappingField::Credit => self.credit = column,
            MappingField::PreviousDebit => self.previous_debit = column,
            MappingField::PreviousCredit => self.previous_credit = column,
        }
    }

    /// Every mapped field with its column, in field order.
    pub fn assigned(&self) -> impl Iterator<Item = (MappingField, usize)> + '_ {
        MappingField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|column| (field, column)))
    }

    pub fn is_claimed(&self, column: usize) -> bool {
        self.assigned().any(|(_, c)| c == column)
    }

    /// Pairs of fields sharing a physical column.
    pub fn duplicate_columns(&self) -> Vec<(MappingField, MappingField, usize)> {
        let assigned: Vec<(MappingField, usize)> = self.assigned().collect();
        let mut duplicates = Vec::new();
        for (i, (first, column)) in assigned.iter().enumerate() {
            for (second, other) in &assigned[i + 1..] {
                if column == other {
                    duplicates.push((*first, *second, *column));
                }
            }
        }
        duplicates
    }

    pub fn maps_scope(&self, scope: YearScope) -> bool {
        match scope {
            YearScope::Current => self.debit.is_some() || self.credit.is_some(),
            YearScope::Previous => self.previous_debit.is_some() || self.previous_credit.is_some(),
        }
    }

    pub fn maps_both_years(&self) -> bool {
        self.maps_scope(YearScope::Current) && self.maps_scope(YearScope::Previous)
    }

    pub fn amount_column(&self, field: AmountField) -> Option<usize> {
        self.get(field.mapping_field())
    }
}

/// A decoded, header-stripped sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetFrame {
    pub sheet_names: Vec<String>,
    pub active_sheet: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Row index of the detected header in the raw sheet, if one was confident.
    #[serde(default)]
    pub header_row: Option<usize>,
}

impl SheetFrame {
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(self.headers.len())
    }
}

/// User-facing configuration of one import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub import_mode: ImportMode,
    pub group_duplicates_to_notes: bool,
    pub sheet_name: Option<String>,
    /// Maps source account names to a standard account name before matching.
    pub account_aliases: BTreeMap<String, String>,
    pub dominant_side_policy: DominantSidePolicy,
    /// Variances up to this amount are reported as rounding, not imbalance.
    pub balance_tolerance: f64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            import_mode: ImportMode::Auto,
            group_duplicates_to_notes: true,
            sheet_name: None,
            account_aliases: BTreeMap::new(),
            dominant_side_policy: DominantSidePolicy::KeepLarger,
            balance_tolerance: 0.1,
        }
    }
}

impl ImportOptions {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Row shape produced by the document-extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedRow {
    #[schemars(description = "The account name exactly as it appears in the trial balance")]
    pub account: String,

    #[serde(default)]
    #[schemars(
        description = "Optional classification: Assets, Liabilities, Equity, Income or Expenses. Free text is accepted and normalized."
    )]
    pub category: Option<String>,

    #[schemars(description = "Current-year debit balance. Use 0 when the balance is a credit.")]
    pub debit: f64,

    #[schemars(description = "Current-year credit balance. Use 0 when the balance is a debit.")]
    pub credit: f64,

    #[serde(default)]
    #[schemars(description = "Previous-year debit balance, when a comparative column exists")]
    pub previous_debit: Option<f64>,

    #[serde(default)]
    #[schemars(description = "Previous-year credit balance, when a comparative column exists")]
    pub previous_credit: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionBatch {
    #[schemars(description = "Every trial balance line found in the document, in document order")]
    pub rows: Vec<ExtractedRow>,
}

impl ExtractionBatch {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExtractionBatch)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = ExtractionBatch::schema_as_json().unwrap();
        assert!(schema_json.contains("previous_debit"));
        assert!(schema_json.contains("account"));
        assert!(schema_json.contains("rows"));
    }

    #[test]
    fn test_cell_value_untagged_serde() {
        let cells: Vec<CellValue> = serde_json::from_str(r#"[null, 12.5, "Bank", true]"#).unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::Empty,
                CellValue::Number(12.5),
                CellValue::Text("Bank".to_string()),
                CellValue::Bool(true),
            ]
        );
    }

    #[test]
    fn test_cell_display_text_drops_trailing_zero() {
        assert_eq!(CellValue::Number(2024.0).display_text(), "2024");
        assert_eq!(CellValue::Number(12.5).display_text(), "12.5");
        assert_eq!(CellValue::from("  Cash ").display_text(), "Cash");
    }

    #[test]
    fn test_duplicate_columns() {
        let mapping = ColumnMapping {
            account: Some(0),
            debit: Some(1),
            credit: Some(1),
            ..Default::default()
        };
        assert_eq!(
            mapping.duplicate_columns(),
            vec![(MappingField::Debit, MappingField::Credit, 1)]
        );
        assert!(mapping.maps_scope(YearScope::Current));
        assert!(!mapping.maps_both_years());
    }

    #[test]
    fn test_import_options_from_json() {
        let options =
            ImportOptions::from_json(r#"{"import_mode": "current_only", "group_duplicates_to_notes": false}"#)
                .unwrap();
        assert_eq!(options.import_mode, ImportMode::CurrentOnly);
        assert!(!options.group_duplicates_to_notes);
        assert_eq!(options.dominant_side_policy, DominantSidePolicy::KeepLarger);
    }

    #[test]
    fn test_base_round_trip() {
        let mut row = LedgerRow::new("Cash", Some(Category::Assets), RowAmounts::default());
        assert!(row.base().is_none());
        row.set_base(RowAmounts {
            debit: 10.0,
            ..Default::default()
        });
        assert_eq!(row.base().unwrap().debit, 10.0);
        assert!(row.has_base());
    }
}
