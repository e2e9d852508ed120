//! Column role resolution.
//!
//! Keyword matching runs first. Whatever it leaves open is filled from a
//! statistical profile of the sample rows. A column is never assigned to two
//! fields.

use crate::chart_of_accounts::is_category_word;
use crate::keywords::{
    best_amount_column, classify_header, AmountQuery, HeaderTraits, Qualifier, ScoreWeights,
    Side, YearContext,
};
use crate::numeric::{is_numeric_cell, parse_cell};
use crate::schema::{CellValue, ColumnMapping, MappingField, YearScope};
use log::{debug, info};
use std::collections::HashSet;

/// Rows profiled per column by the statistical fallback.
pub const MAX_PROFILE_ROWS: usize = 200;

const AMOUNT_STAGES: [Option<Qualifier>; 3] = [Some(Qualifier::Closing), Some(Qualifier::Trial), None];

fn scope_fields(scope: YearScope) -> (MappingField, MappingField) {
    match scope {
        YearScope::Current => (MappingField::Debit, MappingField::Credit),
        YearScope::Previous => (MappingField::PreviousDebit, MappingField::PreviousCredit),
    }
}

fn account_score(traits: &HeaderTraits) -> Option<i32> {
    if !traits.is_account_like() {
        return None;
    }
    let mut score = 10;
    if traits.name {
        score += 2;
    }
    if traits.category {
        score -= 3;
    }
    if traits.code {
        score -= 5;
    }
    Some(score)
}

fn keyword_account(traits: &[HeaderTraits]) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (column, header) in traits.iter().enumerate() {
        if let Some(score) = account_score(header) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((column, score));
            }
        }
    }
    best.map(|(column, _)| column)
}

fn keyword_category(traits: &[HeaderTraits], mapping: &ColumnMapping) -> Option<usize> {
    let unclaimed = |column: usize| !mapping.is_claimed(column);
    traits
        .iter()
        .enumerate()
        .filter(|(column, _)| unclaimed(*column))
        .find(|(_, t)| t.is_category_like() && !t.account)
        .or_else(|| {
            traits
                .iter()
                .enumerate()
                .filter(|(column, _)| unclaimed(*column))
                .find(|(_, t)| t.is_category_like())
        })
        .map(|(column, _)| column)
}

/// Closing pair, then trial pair, then any pair in the year context. A stage
/// that only finds one side is kept as a fallback while later stages look for
/// a complete pair.
fn keyword_pair(
    traits: &[HeaderTraits],
    years: &YearContext,
    scope: YearScope,
    mapping: &ColumnMapping,
) -> (Option<usize>, Option<usize>) {
    let weights = ScoreWeights::default();
    let mut partial: Option<(Option<usize>, Option<usize>)> = None;

    for qualifier in AMOUNT_STAGES {
        let query = |side| AmountQuery {
            side,
            qualifier,
            scope: Some(scope),
        };
        let debit = best_amount_column(traits, &query(Side::Debit), years, None, &weights, &|c| {
            mapping.is_claimed(c)
        });
        let credit = best_amount_column(traits, &query(Side::Credit), years, debit, &weights, &|c| {
            mapping.is_claimed(c) || Some(c) == debit
        });

        match (debit, credit) {
            (Some(_), Some(_)) => {
                debug!(
                    "{:?} year amounts resolved at stage {:?}: {:?}/{:?}",
                    scope, qualifier, debit, credit
                );
                return (debit, credit);
            }
            (None, None) => {}
            _ => {
                partial.get_or_insert((debit, credit));
            }
        }
    }

    partial.unwrap_or((None, None))
}

/// First unclaimed debit-like and credit-like headers, whatever their context.
fn last_resort_pair(traits: &[HeaderTraits], mapping: &ColumnMapping) -> (Option<usize>, Option<usize>) {
    let first = |side: Side, skip: Option<usize>| {
        traits
            .iter()
            .enumerate()
            .find(|(column, t)| {
                t.side() == Some(side) && !mapping.is_claimed(*column) && Some(*column) != skip
            })
            .map(|(column, _)| column)
    };
    let debit = first(Side::Debit, None);
    let credit = first(Side::Credit, debit);
    (debit, credit)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnProfile {
    pub non_blank: usize,
    pub numeric: usize,
    pub textual: usize,
    pub category_hits: usize,
    pub distinct_text: usize,
    /// Every numeric cell is a distinct non-negative whole number.
    pub integer_ids: bool,
}

impl ColumnProfile {
    fn ratio(&self, count: usize) -> f64 {
        if self.non_blank == 0 {
            0.0
        } else {
            count as f64 / self.non_blank as f64
        }
    }

    pub fn numeric_density(&self) -> f64 {
        self.ratio(self.numeric)
    }

    pub fn category_density(&self) -> f64 {
        self.ratio(self.category_hits)
    }

    /// Textual share times the share of distinct values among text cells.
    pub fn textual_diversity(&self) -> f64 {
        if self.textual == 0 {
            return 0.0;
        }
        self.ratio(self.textual) * (self.distinct_text as f64 / self.textual as f64)
    }
}

pub fn profile_columns(rows: &[Vec<CellValue>], column_count: usize) -> Vec<ColumnProfile> {
    (0..column_count)
        .map(|column| {
            let mut profile = ColumnProfile {
                integer_ids: true,
                ..Default::default()
            };
            let mut distinct = HashSet::new();
            let mut ids = HashSet::new();

            for cell in rows
                .iter()
                .take(MAX_PROFILE_ROWS)
                .filter_map(|r| r.get(column))
                .filter(|c| !c.is_blank())
            {
                profile.non_blank += 1;
                if is_numeric_cell(cell) {
                    profile.numeric += 1;
                    let value = parse_cell(cell).value;
                    if value < 0.0 || value.fract() != 0.0 || !ids.insert(value as i64) {
                        profile.integer_ids = false;
                    }
                } else {
                    let text = cell.display_text();
                    if text.chars().any(char::is_alphabetic) {
                        profile.textual += 1;
                        distinct.insert(text.to_lowercase());
                    }
                    if is_category_word(&text) {
                        profile.category_hits += 1;
                    }
                }
            }

            profile.distinct_text = distinct.len();
            if profile.numeric == 0 {
                profile.integer_ids = false;
            }
            profile
        })
        .collect()
}

fn statistical_fill(mapping: &mut ColumnMapping, traits: &[HeaderTraits], profiles: &[ColumnProfile]) {
    if mapping.account.is_none() {
        mapping.account = profiles
            .iter()
            .enumerate()
            .filter(|(column, p)| {
                !mapping.is_claimed(*column)
                    && p.category_density() < 0.5
                    && p.ratio(p.textual) >= 0.5
            })
            .map(|(column, p)| (column, p.textual_diversity()))
            .filter(|(_, score)| *score > 0.0)
            .fold(None, |best: Option<(usize, f64)>, (column, score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((column, score)),
            })
            .map(|(column, _)| column);
        if let Some(column) = mapping.account {
            debug!("Account column {} chosen from data profile", column);
        }
    }

    if mapping.category.is_none() {
        mapping.category = profiles
            .iter()
            .enumerate()
            .filter(|(column, p)| !mapping.is_claimed(*column) && p.category_density() >= 0.5)
            .fold(None, |best: Option<(usize, f64)>, (column, p)| match best {
                Some((_, d)) if d >= p.category_density() => best,
                _ => Some((column, p.category_density())),
            })
            .map(|(column, _)| column);
    }

    if mapping.maps_scope(YearScope::Current) {
        return;
    }

    // Whole-number id columns left of the account column are account codes.
    let account = mapping.account;
    let mut ranked: Vec<(usize, f64)> = profiles
        .iter()
        .enumerate()
        .filter(|(column, p)| {
            let code_header = traits.get(*column).is_some_and(|t| t.code);
            let code_values = p.integer_ids && account.is_some_and(|a| *column < a);
            !mapping.is_claimed(*column) && !code_header && !code_values && p.numeric > 0
        })
        .map(|(column, p)| (column, p.numeric_density()))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let current: Vec<(usize, f64)> = ranked.iter().take(2).copied().collect();
    if current.is_empty() {
        return;
    }
    assign_pair(mapping, YearScope::Current, &current);

    if !mapping.maps_scope(YearScope::Previous) && ranked.len() > 2 {
        let previous: Vec<(usize, f64)> = ranked.iter().skip(2).take(2).copied().collect();
        assign_pair(mapping, YearScope::Previous, &previous);
    }
}

/// Lower column index becomes the debit side.
fn assign_pair(mapping: &mut ColumnMapping, scope: YearScope, chunk: &[(usize, f64)]) {
    let mut columns: Vec<usize> = chunk.iter().map(|(c, _)| *c).collect();
    columns.sort_unstable();
    let (debit_field, credit_field) = scope_fields(scope);
    mapping.set(debit_field, columns.first().copied());
    mapping.set(credit_field, columns.get(1).copied());
    debug!("{:?} year amounts chosen from data profile: {:?}", scope, columns);
}

/// Best-effort default mapping for a sheet. The caller may override any field
/// before the import is confirmed.
pub fn guess_mapping(headers: &[String], sample_rows: &[Vec<CellValue>]) -> ColumnMapping {
    let traits: Vec<HeaderTraits> = headers.iter().map(|h| classify_header(h)).collect();
    let years = YearContext::from_traits(&traits);
    let mut mapping = ColumnMapping::default();

    mapping.account = keyword_account(&traits);
    mapping.category = keyword_category(&traits, &mapping);

    for scope in [YearScope::Current, YearScope::Previous] {
        let (debit, credit) = keyword_pair(&traits, &years, scope, &mapping);
        let (debit_field, credit_field) = scope_fields(scope);
        mapping.set(debit_field, debit);
        mapping.set(credit_field, credit);
    }

    if !mapping.maps_scope(YearScope::Current) {
        // A sheet whose only amounts carry previous-year context is treated
        // as single-year data; the import mode decides where it lands.
        mapping.previous_debit = None;
        mapping.previous_credit = None;
        let (debit, credit) = last_resort_pair(&traits, &mapping);
        mapping.debit = debit;
        mapping.credit = credit;
    }

    let keyword_complete = mapping.account.is_some()
        && mapping.category.is_some()
        && mapping.maps_scope(YearScope::Current);
    if !keyword_complete {
        let column_count = sample_rows
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(headers.len());
        let profiles = profile_columns(sample_rows, column_count);
        statistical_fill(&mut mapping, &traits, &profiles);
    }

    info!(
        "Guessed mapping: account={:?} category={:?} debit={:?} credit={:?} previous_debit={:?} previous_credit={:?}",
        mapping.account,
        mapping.category,
        mapping.debit,
        mapping.credit,
        mapping.previous_debit,
        mapping.previous_credit
    );
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(data: &[&[&str]]) -> Vec<Vec<CellValue>> {
        data.iter()
            .map(|r| r.iter().map(|c| CellValue::from(*c)).collect())
            .collect()
    }

    #[test]
    fn test_simple_keyword_mapping() {
        let mapping = guess_mapping(&headers(&["Account", "Category", "Debit", "Credit"]), &[]);
        assert_eq!(mapping.account, Some(0));
        assert_eq!(mapping.category, Some(1));
        assert_eq!(mapping.debit, Some(2));
        assert_eq!(mapping.credit, Some(3));
        assert_eq!(mapping.previous_debit, None);
    }

    #[test]
    fn test_year_pairs() {
        let mapping = guess_mapping(
            &headers(&["Account", "2024 Debit", "2024 Credit", "2023 Debit", "2023 Credit"]),
            &[],
        );
        assert_eq!((mapping.debit, mapping.credit), (Some(1), Some(2)));
        assert_eq!((mapping.previous_debit, mapping.previous_credit), (Some(3), Some(4)));
    }

    #[test]
    fn test_prefers_closing_over_opening() {
        let mapping = guess_mapping(
            &headers(&[
                "Account Code",
                "Account Name",
                "Opening Debit",
                "Opening Credit",
                "Closing Debit",
                "Closing Credit",
            ]),
            &[],
        );
        assert_eq!(mapping.account, Some(1));
        assert_eq!((mapping.debit, mapping.credit), (Some(4), Some(5)));
        assert_eq!(mapping.previous_debit, None);
    }

    #[test]
    fn test_previous_context_words() {
        let mapping = guess_mapping(
            &headers(&["Particulars", "Dr", "Cr", "Prior Year Dr", "Prior Year Cr"]),
            &[],
        );
        assert_eq!(mapping.account, Some(0));
        assert_eq!((mapping.debit, mapping.credit), (Some(1), Some(2)));
        assert_eq!((mapping.previous_debit, mapping.previous_credit), (Some(3), Some(4)));
    }

    #[test]
    fn test_last_resort_takes_previous_only_headers() {
        let mapping = guess_mapping(&headers(&["Account", "PY Debit", "PY Credit"]), &[]);
        assert_eq!((mapping.debit, mapping.credit), (Some(1), Some(2)));
        assert_eq!(mapping.previous_debit, None);
        assert!(mapping.duplicate_columns().is_empty());
    }

    #[test]
    fn test_statistical_fallback() {
        let data = rows(&[
            &["1001", "Cash", "Assets", "500.00", ""],
            &["2001", "Payables", "Liabilities", "", "300.00"],
            &["3001", "Capital", "Equity", "", "200.00"],
            &["4001", "Rent", "Expenses", "0", ""],
        ]);
        let mapping = guess_mapping(
            &headers(&["Column A", "Column B", "Column C", "Column D", "Column E"]),
            &data,
        );
        assert_eq!(mapping.account, Some(1));
        assert_eq!(mapping.category, Some(2));
        assert_eq!((mapping.debit, mapping.credit), (Some(3), Some(4)));
        assert!(mapping.duplicate_columns().is_empty());
    }

    #[test]
    fn test_never_duplicates_columns() {
        let mapping = guess_mapping(&headers(&["Account", "Debit/Credit", "Debit"]), &[]);
        assert!(mapping.duplicate_columns().is_empty());
        assert_eq!(mapping.debit, Some(2));
    }
}
