//! Keyword tables and header classification shared by the header classifier,
//! the column role resolver and the row amount resolver.
//!
//! All tables are immutable and built once. Amount-column lookups go through
//! one scorer, [`score_amount_header`], parameterized by an [`AmountQuery`]
//! and explicit [`ScoreWeights`].

use crate::schema::YearScope;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static ACCOUNT_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "account",
        "accounts",
        "acct",
        "ledger",
        "ledgers",
        "description",
        "particular",
        "particulars",
    ]
    .into_iter()
    .collect()
});

static CATEGORY_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ["category", "class", "classification", "type", "group"]
        .into_iter()
        .collect()
});

static CODE_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ["code", "no", "number", "id", "ref", "gl"].into_iter().collect());

static PREVIOUS_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ["previous", "prior", "last", "py", "preceding", "comparative"]
        .into_iter()
        .collect()
});

static CURRENT_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ["current", "this", "cy"].into_iter().collect());

static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:fy)?((?:19|20)\d{2})$").expect("valid year regex"));

/// Lowercases and turns every run of separators into one space.
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a `2024` / `FY2024` token.
pub fn year_from_token(token: &str) -> Option<i32> {
    YEAR_TOKEN
        .captures(token)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Closing,
    Trial,
    Opening,
}

/// Everything the resolvers need to know about one header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderTraits {
    pub account: bool,
    pub name: bool,
    pub category: bool,
    pub code: bool,
    pub debit: bool,
    pub credit: bool,
    pub closing: bool,
    pub trial: bool,
    pub opening: bool,
    pub previous_context: bool,
    pub current_context: bool,
    pub year: Option<i32>,
}

impl HeaderTraits {
    pub fn side(&self) -> Option<Side> {
        match (self.debit, self.credit) {
            (true, false) => Some(Side::Debit),
            (false, true) => Some(Side::Credit),
            _ => None,
        }
    }

    pub fn is_amount(&self) -> bool {
        self.debit || self.credit
    }

    pub fn is_account_like(&self) -> bool {
        self.account && !self.is_amount()
    }

    pub fn is_category_like(&self) -> bool {
        self.category && !self.is_amount()
    }

    pub fn has_qualifier(&self, qualifier: Qualifier) -> bool {
        match qualifier {
            Qualifier::Closing => self.closing,
            Qualifier::Trial => self.trial,
            Qualifier::Opening => self.opening,
        }
    }

    /// Year scope the header belongs to, `None` when it carries no context.
    pub fn scope(&self, years: &YearContext) -> Option<YearScope> {
        let previous = self.previous_context
            || (self.year.is_some() && self.year == years.previous);
        let current = self.current_context || (self.year.is_some() && self.year == years.current);
        match (previous, current) {
            (true, _) => Some(YearScope::Previous),
            (false, true) => Some(YearScope::Current),
            _ => None,
        }
    }

    /// Headers without context count as current year; previous year needs
    /// explicit evidence.
    pub fn in_scope(&self, scope: YearScope, years: &YearContext) -> bool {
        match (scope, self.scope(years)) {
            (YearScope::Previous, found) => found == Some(YearScope::Previous),
            (YearScope::Current, found) => found != Some(YearScope::Previous),
        }
    }
}

pub fn classify_header(header: &str) -> HeaderTraits {
    let normalized = normalize_header(header);
    let mut traits = HeaderTraits::default();

    for token in normalized.split(' ').filter(|t| !t.is_empty()) {
        if ACCOUNT_WORDS.contains(token) {
            traits.account = true;
        }
        if token == "name" || token == "names" {
            traits.name = true;
        }
        if CATEGORY_WORDS.contains(token) {
            traits.category = true;
        }
        if CODE_WORDS.contains(token) {
            traits.code = true;
        }
        if token.starts_with("debit") || token == "dr" {
            traits.debit = true;
        }
        if token.starts_with("credit") || token == "cr" {
            traits.credit = true;
        }
        if token == "closing" || token == "ending" {
            traits.closing = true;
        }
        if token == "trial" || token == "trail" {
            traits.trial = true;
        }
        if token == "opening" {
            traits.opening = true;
        }
        if PREVIOUS_WORDS.contains(token) {
            traits.previous_context = true;
        }
        if CURRENT_WORDS.contains(token) {
            traits.current_context = true;
        }
        if traits.year.is_none() {
            traits.year = year_from_token(token);
        }
    }

    traits
}

/// The (at most two) distinct years mentioned across a header set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearContext {
    pub current: Option<i32>,
    pub previous: Option<i32>,
}

impl YearContext {
    pub fn from_traits(traits: &[HeaderTraits]) -> Self {
        let mut years: Vec<i32> = traits.iter().filter_map(|t| t.year).collect();
        years.sort_unstable_by(|a, b| b.cmp(a));
        years.dedup();
        Self {
            current: years.first().copied(),
            previous: years.get(1).copied(),
        }
    }
}

/// What kind of amount column a caller is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountQuery {
    pub side: Side,
    /// Required qualifier; `None` accepts any.
    pub qualifier: Option<Qualifier>,
    /// Required year scope; `None` accepts any context.
    pub scope: Option<YearScope>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub base: f64,
    pub closing: f64,
    pub trial: f64,
    pub opening: f64,
    pub explicit_context: f64,
    /// Per column of distance from an anchor column.
    pub distance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            base: 10.0,
            closing: 3.0,
            trial: 2.0,
            opening: -4.0,
            explicit_context: 1.0,
            distance: 0.0,
        }
    }
}

impl ScoreWeights {
    /// Weights for candidate lookups that should stay near a mapped column.
    pub fn proximity() -> Self {
        Self {
            distance: 0.5,
            ..Self::default()
        }
    }
}

/// Scores one header against a query, `None` when it does not match.
pub fn score_amount_header(
    traits: &HeaderTraits,
    column: usize,
    query: &AmountQuery,
    years: &YearContext,
    anchor: Option<usize>,
    weights: &ScoreWeights,
) -> Option<f64> {
    if traits.side() != Some(query.side) {
        return None;
    }
    if let Some(qualifier) = query.qualifier {
        if !traits.has_qualifier(qualifier) {
            return None;
        }
    }
    if let Some(scope) = query.scope {
        if !traits.in_scope(scope, years) {
            return None;
        }
    }

    let mut score = weights.base;
    if traits.closing {
        score += weights.closing;
    }
    if traits.trial {
        score += weights.trial;
    }
    if traits.opening {
        score += weights.opening;
    }
    if traits.scope(years).is_some() {
        score += weights.explicit_context;
    }
    if let Some(anchor) = anchor {
        score -= weights.distance * column.abs_diff(anchor) as f64;
    }
    Some(score)
}

/// Best matching column, skipping `excluded`. Ties go to the leftmost column.
pub fn best_amount_column(
    traits: &[HeaderTraits],
    query: &AmountQuery,
    years: &YearContext,
    anchor: Option<usize>,
    weights: &ScoreWeights,
    excluded: &dyn Fn(usize) -> bool,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (column, header) in traits.iter().enumerate() {
        if excluded(column) {
            continue;
        }
        if let Some(score) = score_amount_header(header, column, query, years, anchor, weights) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((column, score));
            }
        }
    }
    best.map(|(column, _)| column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Closing_Balance (Dr.) "), "closing balance dr");
        assert_eq!(normalize_header("FY-2024/Credit"), "fy 2024 credit");
    }

    #[test]
    fn test_classify_header() {
        let traits = classify_header("Closing Balance Dr 2024");
        assert!(traits.debit && traits.closing);
        assert_eq!(traits.year, Some(2024));

        let traits = classify_header("Account Name");
        assert!(traits.is_account_like());

        let traits = classify_header("Trail Balance - Credit (PY)");
        assert!(traits.credit && traits.trial && traits.previous_context);

        assert_eq!(classify_header("FY2023").year, Some(2023));
        assert!(!classify_header("Description of credit terms").is_account_like());
    }

    #[test]
    fn test_year_context_and_scope() {
        let traits: Vec<HeaderTraits> = ["2023 Debit", "2024 Debit", "Debit"]
            .iter()
            .map(|h| classify_header(h))
            .collect();
        let years = YearContext::from_traits(&traits);
        assert_eq!(years.current, Some(2024));
        assert_eq!(years.previous, Some(2023));

        assert_eq!(traits[0].scope(&years), Some(YearScope::Previous));
        assert_eq!(traits[1].scope(&years), Some(YearScope::Current));
        assert!(traits[2].in_scope(YearScope::Current, &years));
        assert!(!traits[2].in_scope(YearScope::Previous, &years));
    }

    #[test]
    fn test_best_amount_column_prefers_closing_and_proximity() {
        let traits: Vec<HeaderTraits> = [
            "Opening Debit",
            "Opening Credit",
            "Closing Debit",
            "Closing Credit",
        ]
        .iter()
        .map(|h| classify_header(h))
        .collect();
        let years = YearContext::from_traits(&traits);
        let query = AmountQuery {
            side: Side::Debit,
            qualifier: None,
            scope: Some(YearScope::Current),
        };

        let best = best_amount_column(&traits, &query, &years, None, &ScoreWeights::default(), &|_| false);
        assert_eq!(best, Some(2));

        let excluded = best_amount_column(&traits, &query, &years, None, &ScoreWeights::default(), &|c| c == 2);
        assert_eq!(excluded, Some(0));
    }
}
