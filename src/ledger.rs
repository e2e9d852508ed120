//! The long-lived trial balance and its working notes.
//!
//! [`Ledger`] is a value type. Every edit returns a new ledger with the Totals
//! row recomputed from scratch; the caller decides which version is current.
//!
//! Rows that have had notes applied carry base amounts, and for those rows
//! `displayed = base + note totals` holds per field after every operation.
//! Imported rows have at most one non-zero side per year. A note on the
//! opposite side of its base is kept field by field, so such a row shows both
//! a debit and a credit until the user nets them.

use crate::chart_of_accounts::{infer_category, AccountAliases};
use crate::error::{Result, TrialBalanceError};
use crate::numeric::round2;
use crate::schema::{
    AmountField, Category, ImportOptions, LedgerRow, NotesMap, RowAmounts, WorkingNote, YearScope,
    AUTO_GROUP_PREFIX, TOTALS_ACCOUNT,
};
use crate::utils::{clean_account_name, is_total_label, normalize_account_name};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A parsed line on its way into the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedRow {
    pub account: String,
    pub category: Option<Category>,
    pub amounts: RowAmounts,
}

impl ImportedRow {
    pub fn new(account: impl Into<String>, category: Option<Category>, amounts: RowAmounts) -> Self {
        Self {
            account: account.into(),
            category,
            amounts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
    /// Duplicate lines turned into auto-grouped notes.
    pub grouped: usize,
    /// Duplicate lines that replaced the earlier line because grouping is off.
    pub overwritten: usize,
    pub skipped_blank: usize,
    pub skipped_totals: usize,
    /// Auto-grouped notes from an earlier import that were cleared.
    pub cleared_auto_notes: usize,
}

/// Sum of notes per field, split by year scope.
pub fn note_totals(notes: &[WorkingNote]) -> RowAmounts {
    notes.iter().fold(RowAmounts::default(), |mut totals, note| {
        match note.year_scope {
            YearScope::Current => {
                totals.debit += note.debit;
                totals.credit += note.credit;
            }
            YearScope::Previous => {
                totals.previous_debit += note.debit;
                totals.previous_credit += note.credit;
            }
        }
        totals
    })
}

/// One note per year scope that carries a value.
fn notes_from_amounts(description: &str, amounts: RowAmounts) -> Vec<WorkingNote> {
    [YearScope::Current, YearScope::Previous]
        .into_iter()
        .filter(|scope| amounts.has_scope(*scope))
        .map(|scope| {
            let (debit, credit) = amounts.pair(scope);
            WorkingNote::new(description, debit, credit, scope)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    rows: Vec<LedgerRow>,
    #[serde(default)]
    notes: NotesMap,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::from_parts(Vec::new(), NotesMap::new())
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from existing rows and notes. Any Totals row in `rows`
    /// is discarded and rebuilt.
    pub fn from_parts(rows: Vec<LedgerRow>, notes: NotesMap) -> Self {
        let mut ledger = Self { rows, notes };
        ledger.rebuild_totals();
        ledger
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let ledger: Ledger = serde_json::from_str(json)?;
        Ok(Self::from_parts(ledger.rows, ledger.notes))
    }

    /// All rows, the Totals row last.
    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn accounts(&self) -> impl Iterator<Item = &LedgerRow> {
        self.rows.iter().filter(|r| !r.is_totals())
    }

    pub fn notes(&self) -> &NotesMap {
        &self.notes
    }

    /// Notes of an account, matched by normalized name like [`Ledger::row`].
    pub fn notes_for(&self, account: &str) -> &[WorkingNote] {
        self.find_index(account)
            .and_then(|index| self.notes.get(&self.rows[index].account))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn row(&self, account: &str) -> Option<&LedgerRow> {
        self.find_index(account).map(|i| &self.rows[i])
    }

    pub fn totals(&self) -> RowAmounts {
        self.rows
            .iter()
            .find(|r| r.is_totals())
            .map(LedgerRow::amounts)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.accounts().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_index(&self, account: &str) -> Option<usize> {
        let key = normalize_account_name(account);
        if key.is_empty() {
            return None;
        }
        self.rows
            .iter()
            .position(|r| !r.is_totals() && normalize_account_name(&r.account) == key)
    }

    fn editable_index(&self, account: &str) -> Result<usize> {
        if is_reserved(account) {
            return Err(TrialBalanceError::ReservedAccount(account.to_string()));
        }
        self.find_index(account)
            .ok_or_else(|| TrialBalanceError::UnknownAccount(account.to_string()))
    }

    /// Base amounts of a row, derived as `displayed - note totals` when the
    /// row has never had base fields set.
    fn effective_base(&self, index: usize) -> RowAmounts {
        let row = &self.rows[index];
        row.base()
            .unwrap_or_else(|| row.amounts() - note_totals(self.notes_for(&row.account)))
    }

    /// Replaces the notes of a row and recomputes displayed amounts from its
    /// base.
    fn apply_notes(&mut self, index: usize, notes: Vec<WorkingNote>) {
        let base = self.effective_base(index);
        let account = self.rows[index].account.clone();
        let totals = note_totals(&notes);

        let row = &mut self.rows[index];
        row.set_base(base);
        row.set_amounts(base + totals);

        if notes.is_empty() {
            self.notes.remove(&account);
        } else {
            self.notes.insert(account, notes);
        }
    }

    /// Sets new base amounts for a row, keeping its notes.
    fn apply_base(&mut self, index: usize, base: RowAmounts) {
        let notes = self.notes_for(&self.rows[index].account);
        let has_notes = !notes.is_empty();
        let totals = note_totals(notes);
        let row = &mut self.rows[index];
        if row.has_base() || has_notes {
            row.set_base(base);
        }
        row.set_amounts(base + totals);
    }

    fn rebuild_totals(&mut self) {
        self.rows.retain(|r| !r.is_totals());
        let sum = self
            .rows
            .iter()
            .fold(RowAmounts::default(), |acc, r| acc + r.amounts());
        let rounded = RowAmounts {
            debit: round2(sum.debit),
            credit: round2(sum.credit),
            previous_debit: round2(sum.previous_debit),
            previous_credit: round2(sum.previous_credit),
        };
        self.rows.push(LedgerRow::new(TOTALS_ACCOUNT, None, rounded));
    }

    fn finish(mut self) -> Self {
        self.rebuild_totals();
        self
    }

    /// Edits one displayed amount. For rows with notes the base is re-solved
    /// as `value - note total`; notes are untouched.
    pub fn with_cell_edit(&self, account: &str, field: AmountField, value: f64) -> Result<Ledger> {
        let index = self.editable_index(account)?;
        let mut ledger = self.clone();

        let row_name = ledger.rows[index].account.clone();
        let totals = note_totals(ledger.notes_for(&row_name));
        let tracks_base = ledger.rows[index].has_base() || ledger.notes.contains_key(&row_name);

        if tracks_base {
            let mut base = ledger.effective_base(index);
            base.set(field, value - totals.get(field));
            ledger.rows[index].set_base(base);
        }
        let mut displayed = ledger.rows[index].amounts();
        displayed.set(field, value);
        ledger.rows[index].set_amounts(displayed);

        debug!("Edited {:?} of '{}' to {}", field, row_name, value);
        Ok(ledger.finish())
    }

    /// Replaces the working notes of an account. The first time notes are
    /// saved the base is derived from the displayed amounts; afterwards the
    /// stored base is authoritative.
    pub fn with_notes(&self, account: &str, notes: Vec<WorkingNote>) -> Result<Ledger> {
        let index = self.editable_index(account)?;
        let mut ledger = self.clone();
        ledger.apply_notes(index, notes);
        Ok(ledger.finish())
    }

    pub fn set_category(&self, account: &str, category: Option<Category>) -> Result<Ledger> {
        let index = self.editable_index(account)?;
        let mut ledger = self.clone();
        ledger.rows[index].category = category;
        Ok(ledger.finish())
    }

    /// Renames an account. Renaming onto an existing account merges the two:
    /// bases are summed and notes concatenated.
    pub fn rename_account(&self, account: &str, new_name: &str) -> Result<Ledger> {
        let new_name = clean_account_name(new_name);
        if new_name.is_empty() {
            return Err(TrialBalanceError::BlankAccountName);
        }
        if is_reserved(&new_name) {
            return Err(TrialBalanceError::ReservedAccount(new_name));
        }
        let index = self.editable_index(account)?;
        let mut ledger = self.clone();
        let old_name = ledger.rows[index].account.clone();

        match ledger.find_index(&new_name).filter(|&i| i != index) {
            Some(target) => {
                let base = ledger.effective_base(index) + ledger.effective_base(target);
                let target_name = ledger.rows[target].account.clone();
                let mut notes = ledger.notes.remove(&target_name).unwrap_or_default();
                notes.extend(ledger.notes.remove(&old_name).unwrap_or_default());

                if ledger.rows[target].category.is_none() {
                    ledger.rows[target].category = ledger.rows[index].category;
                }
                let had_base = ledger.rows[index].has_base() || ledger.rows[target].has_base();
                let totals = note_totals(&notes);
                let row = &mut ledger.rows[target];
                if had_base || !notes.is_empty() {
                    row.set_base(base);
                }
                row.set_amounts(base + totals);
                if !notes.is_empty() {
                    ledger.notes.insert(target_name.clone(), notes);
                }
                ledger.rows.remove(index);
                info!("Merged '{}' into '{}'", old_name, target_name);
            }
            None => {
                if let Some(notes) = ledger.notes.remove(&old_name) {
                    ledger.notes.insert(new_name.clone(), notes);
                }
                ledger.rows[index].account = new_name.clone();
                info!("Renamed '{}' to '{}'", old_name, new_name);
            }
        }

        Ok(ledger.finish())
    }

    pub fn delete_account(&self, account: &str) -> Result<Ledger> {
        let index = self.editable_index(account)?;
        let mut ledger = self.clone();
        let removed = ledger.rows.remove(index);
        ledger.notes.remove(&removed.account);
        info!("Deleted account '{}'", removed.account);
        Ok(ledger.finish())
    }

    /// Folds several accounts into `target`. Each source's displayed amounts
    /// become `Grouped: <source>` notes on the target and the source rows are
    /// removed. The target is created when it does not exist.
    pub fn group_accounts(&self, sources: &[String], target: &str) -> Result<Ledger> {
        let target_name = clean_account_name(target);
        if target_name.is_empty() {
            return Err(TrialBalanceError::BlankAccountName);
        }
        if is_reserved(&target_name) {
            return Err(TrialBalanceError::ReservedAccount(target_name));
        }
        let target_key = normalize_account_name(&target_name);

        let mut ledger = self.clone();
        let mut grouped_notes = Vec::new();
        let mut first_category = None;

        for source in sources {
            if normalize_account_name(source) == target_key {
                continue;
            }
            let index = ledger.editable_index(source)?;
            let row = ledger.rows.remove(index);
            ledger.notes.remove(&row.account);
            first_category = first_category.or(row.category);
            grouped_notes.extend(notes_from_amounts(
                &format!("Grouped: {}", row.account),
                row.amounts(),
            ));
        }

        let index = match ledger.find_index(&target_name) {
            Some(index) => index,
            None => {
                ledger.rows.push(LedgerRow::new(
                    target_name.clone(),
                    first_category.or_else(|| infer_category(&target_name)),
                    RowAmounts::default(),
                ));
                ledger.rows.len() - 1
            }
        };

        let mut notes = ledger.notes_for(&ledger.rows[index].account).to_vec();
        notes.extend(grouped_notes);
        ledger.apply_notes(index, notes);

        info!("Grouped {} account(s) into '{}'", sources.len(), target_name);
        Ok(ledger.finish())
    }

    /// Removes auto-grouped notes from the given row, returning how many.
    fn clear_auto_notes(&mut self, index: usize) -> usize {
        let account = self.rows[index].account.clone();
        let notes = self.notes_for(&account);
        let cleared = notes.iter().filter(|n| n.is_auto_grouped()).count();
        if cleared > 0 {
            let kept: Vec<WorkingNote> = notes.iter().filter(|n| !n.is_auto_grouped()).cloned().collect();
            self.apply_notes(index, kept);
        }
        cleared
    }

    /// Merges a batch into the ledger by normalized account name.
    ///
    /// The first line for an account creates or updates its row. Later lines
    /// for the same account become `[Auto-grouped]` notes when
    /// `group_duplicates_to_notes` is set and overwrite the row otherwise.
    /// Auto-grouped notes left by a previous import of the same accounts are
    /// cleared first so re-imports replace rather than accumulate.
    pub fn upsert(&self, incoming: &[ImportedRow], options: &ImportOptions) -> (Ledger, MergeSummary) {
        let aliases = AccountAliases::from_map(&options.account_aliases);
        let mut ledger = self.clone();
        let mut summary = MergeSummary::default();

        let mut batch: Vec<(String, String, &ImportedRow)> = Vec::with_capacity(incoming.len());
        for row in incoming {
            let name = aliases.resolve(&row.account);
            let key = normalize_account_name(&name);
            if key.is_empty() {
                summary.skipped_blank += 1;
            } else if is_total_label(&name) {
                summary.skipped_totals += 1;
            } else {
                batch.push((name, key, row));
            }
        }

        let touched: BTreeSet<&str> = batch.iter().map(|(_, key, _)| key.as_str()).collect();
        for index in 0..ledger.rows.len() {
            let row = &ledger.rows[index];
            if !row.is_totals() && touched.contains(normalize_account_name(&row.account).as_str()) {
                summary.cleared_auto_notes += ledger.clear_auto_notes(index);
            }
        }

        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for (name, key, row) in &batch {
            let count = occurrences.entry(key.as_str()).or_insert(0);
            *count += 1;
            let occurrence = *count;

            match ledger.find_index(name) {
                None => {
                    let category = row.category.or_else(|| infer_category(name));
                    ledger.rows.push(LedgerRow::new(name.clone(), category, row.amounts));
                    summary.created += 1;
                }
                Some(index) if occurrence == 1 || !options.group_duplicates_to_notes => {
                    if let Some(category) = row.category {
                        ledger.rows[index].category = Some(category);
                    }
                    ledger.apply_base(index, row.amounts);
                    if occurrence == 1 {
                        summary.updated += 1;
                    } else {
                        summary.overwritten += 1;
                    }
                }
                Some(index) => {
                    let account = ledger.rows[index].account.clone();
                    let description = format!("{} {} #{}", AUTO_GROUP_PREFIX, name, occurrence);
                    let mut notes = ledger.notes_for(&account).to_vec();
                    notes.extend(notes_from_amounts(&description, row.amounts));
                    ledger.apply_notes(index, notes);
                    summary.grouped += 1;
                    debug!("Duplicate line for '{}' kept as note '{}'", account, description);
                }
            }
        }

        info!(
            "Merged {} line(s): {} created, {} updated, {} grouped, {} overwritten",
            batch.len(),
            summary.created,
            summary.updated,
            summary.grouped,
            summary.overwritten
        );
        (ledger.finish(), summary)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "Account",
            "Category",
            "Debit",
            "Credit",
            "Previous Debit",
            "Previous Credit",
        ])?;
        for row in &self.rows {
            writer.write_record([
                row.account.clone(),
                row.category.map(|c| c.to_string()).unwrap_or_default(),
                format!("{:.2}", row.debit),
                format!("{:.2}", row.credit),
                format!("{:.2}", row.previous_debit),
                format!("{:.2}", row.previous_credit),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn is_reserved(account: &str) -> bool {
    normalize_account_name(account) == normalize_account_name(TOTALS_ACCOUNT)
}
