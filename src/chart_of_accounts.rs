use crate::error::Result;
use crate::schema::{Category, LedgerRow};
use crate::utils::{clean_account_name, normalize_account_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Ordered inference rules; the first rule with a matching phrase wins, so
/// specific phrases ("bank charges") sit above the generic words ("bank").
static INFERENCE_RULES: LazyLock<Vec<(Vec<&'static str>, Category)>> = LazyLock::new(|| {
    vec![
        (
            vec![
                "bank charges",
                "interest expense",
                "interest paid",
                "cost of sales",
                "cost of goods",
                "income tax expense",
            ],
            Category::Expenses,
        ),
        (vec!["accumulated depreciation"], Category::Assets),
        (
            vec![
                "interest income",
                "interest received",
                "other income",
                "discount received",
                "rental income",
            ],
            Category::Income,
        ),
        (
            vec![
                "payable",
                "payables",
                "creditors",
                "accrued",
                "accruals",
                "overdraft",
                "borrowings",
                "loan",
                "loans",
                "vat",
                "gst",
                "provision",
                "provisions",
                "unearned",
                "deferred",
                "liability",
                "liabilities",
            ],
            Category::Liabilities,
        ),
        (
            vec![
                "capital",
                "equity",
                "retained",
                "reserve",
                "reserves",
                "drawings",
                "dividend",
                "dividends",
                "share",
                "shares",
            ],
            Category::Equity,
        ),
        (
            vec![
                "cash",
                "bank",
                "receivable",
                "receivables",
                "debtors",
                "inventory",
                "inventories",
                "stock",
                "prepaid",
                "prepayment",
                "prepayments",
                "deposit",
                "deposits",
                "equipment",
                "furniture",
                "vehicle",
                "vehicles",
                "building",
                "buildings",
                "land",
                "machinery",
                "asset",
                "assets",
                "investment",
                "investments",
            ],
            Category::Assets,
        ),
        (
            vec!["sales", "revenue", "revenues", "income", "turnover", "commission"],
            Category::Income,
        ),
        (
            vec![
                "expense",
                "expenses",
                "cost",
                "costs",
                "salaries",
                "salary",
                "wages",
                "rent",
                "utilities",
                "electricity",
                "depreciation",
                "amortisation",
                "amortization",
                "insurance",
                "repairs",
                "maintenance",
                "advertising",
                "marketing",
                "purchases",
                "telephone",
                "travel",
                "fees",
                "postage",
                "printing",
                "stationery",
                "subscriptions",
            ],
            Category::Expenses,
        ),
    ]
});

fn contains_phrase(padded_key: &str, phrase: &str) -> bool {
    padded_key.contains(&format!(" {} ", phrase))
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Assets,
        Category::Liabilities,
        Category::Equity,
        Category::Income,
        Category::Expenses,
    ];

    /// Normalizes a free-text category label such as `"Current Assets"`,
    /// `"revenue"` or `"Cost of Sales"`.
    pub fn from_label(label: &str) -> Option<Category> {
        let key = normalize_account_name(label);
        if key.is_empty() {
            return None;
        }
        let padded = format!(" {} ", key);
        let any = |words: &[&str]| words.iter().any(|w| contains_phrase(&padded, w));

        if any(&["expense", "expenses", "expenditure", "cost", "costs", "overheads"]) {
            Some(Category::Expenses)
        } else if any(&["income", "revenue", "revenues", "sales", "turnover"]) {
            Some(Category::Income)
        } else if any(&["liability", "liabilities", "creditors"]) {
            Some(Category::Liabilities)
        } else if any(&["equity", "capital", "reserves"]) {
            Some(Category::Equity)
        } else if any(&["asset", "assets"]) {
            Some(Category::Assets)
        } else {
            None
        }
    }
}

/// Guesses a category from an account name.
pub fn infer_category(account: &str) -> Option<Category> {
    let key = normalize_account_name(account);
    if key.is_empty() {
        return None;
    }
    let padded = format!(" {} ", key);
    INFERENCE_RULES
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|p| contains_phrase(&padded, p)))
        .map(|(_, category)| *category)
}

/// Whether a cell holds a bare category value (`"Assets"`, `"Current
/// Liabilities"`). Used when profiling columns without useful headers.
pub fn is_category_word(text: &str) -> bool {
    let key = normalize_account_name(text);
    let tokens = key.split(' ').filter(|t| !t.is_empty()).count();
    (1..=3).contains(&tokens) && Category::from_label(&key).is_some()
}

/// Standard account names keyed by the normalized source name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountAliases {
    by_key: BTreeMap<String, String>,
}

impl AccountAliases {
    pub fn from_map(aliases: &BTreeMap<String, String>) -> Self {
        let by_key = aliases
            .iter()
            .filter(|(_, standard)| !standard.trim().is_empty())
            .map(|(source, standard)| (normalize_account_name(source), clean_account_name(standard)))
            .collect();
        Self { by_key }
    }

    /// The standard name for `account`, or the cleaned account name itself.
    pub fn resolve(&self, account: &str) -> String {
        self.by_key
            .get(&normalize_account_name(account))
            .cloned()
            .unwrap_or_else(|| clean_account_name(account))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub name: String,
    pub category: Option<Category>,
    /// True when the category came from the account name, not the source.
    pub inferred: bool,
}

/// Ledger accounts grouped by category, for review before reports are built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub assets: Vec<AccountEntry>,
    pub liabilities: Vec<AccountEntry>,
    pub equity: Vec<AccountEntry>,
    pub income: Vec<AccountEntry>,
    pub expenses: Vec<AccountEntry>,
    pub uncategorized: Vec<AccountEntry>,
}

impl ChartOfAccounts {
    pub fn from_rows(rows: &[LedgerRow]) -> Self {
        let mut chart = Self::default();

        for row in rows.iter().filter(|r| !r.is_totals()) {
            let (category, inferred) = match row.category {
                Some(category) => (Some(category), false),
                None => (infer_category(&row.account), true),
            };
            let entry = AccountEntry {
                name: row.account.clone(),
                category,
                inferred: inferred && category.is_some(),
            };
            match category {
                Some(category) => chart.section_mut(category).push(entry),
                None => chart.uncategorized.push(entry),
            }
        }

        for category in Category::ALL {
            chart.section_mut(category).sort_by(|a, b| a.name.cmp(&b.name));
        }
        chart.uncategorized.sort_by(|a, b| a.name.cmp(&b.name));

        chart
    }

    pub fn section(&self, category: Category) -> &[AccountEntry] {
        match category {
            Category::Assets => &self.assets,
            Category::Liabilities => &self.liabilities,
            Category::Equity => &self.equity,
            Category::Income => &self.income,
            Category::Expenses => &self.expenses,
        }
    }

    fn section_mut(&mut self, category: Category) -> &mut Vec<AccountEntry> {
        match category {
            Category::Assets => &mut self.assets,
            Category::Liabilities => &mut self.liabilities,
            Category::Equity => &mut self.equity,
            Category::Income => &mut self.income,
            Category::Expenses => &mut self.expenses,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["Section", "Account Name", "Inferred"])?;

        for category in Category::ALL {
            for account in self.section(category) {
                writer.write_record([
                    category.to_string(),
                    account.name.clone(),
                    account.inferred.to_string(),
                ])?;
            }
        }
        for account in &self.uncategorized {
            writer.write_record(["Uncategorized", account.name.as_str(), "false"])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Chart of Accounts\n\n");

        for category in Category::ALL {
            output.push_str(&format!("## {}\n\n", category));
            for account in self.section(category) {
                let marker = if account.inferred { " *(inferred)*" } else { "" };
                output.push_str(&format!("- {}{}\n", account.name, marker));
            }
            output.push('\n');
        }

        if !self.uncategorized.is_empty() {
            output.push_str("## Uncategorized\n\n");
            for account in &self.uncategorized {
                output.push_str(&format!("- {}\n", account.name));
            }
            output.push('\n');
        }

        output
    }

    pub fn total_accounts(&self) -> usize {
        Category::ALL
            .iter()
            .map(|c| self.section(*c).len())
            .sum::<usize>()
            + self.uncategorized.len()
    }
}
