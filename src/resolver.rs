//! Per-row amount resolution.
//!
//! Each year scope has up to three candidate column pairs: the mapped pair,
//! the nearest "Closing" pair and the nearest "Trial" pair. The mapped pair is
//! trusted whenever it carries a value; otherwise the candidates compete on
//! shape (one side populated beats two) and source.

use crate::keywords::{
    best_amount_column, classify_header, AmountQuery, HeaderTraits, Qualifier, ScoreWeights,
    Side, YearContext,
};
use crate::numeric::{parse_cell, NOISE_FLOOR};
use crate::schema::{AmountField, CellValue, ColumnMapping, DominantSidePolicy, RowAmounts, YearScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Mapped,
    Closing,
    Trial,
}

impl CandidateSource {
    fn preference(self) -> f64 {
        match self {
            CandidateSource::Closing => 3.0,
            CandidateSource::Trial => 2.0,
            CandidateSource::Mapped => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePair {
    pub source: CandidateSource,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
}

impl CandidatePair {
    fn is_empty(&self) -> bool {
        self.debit.is_none() && self.credit.is_none()
    }

    fn same_columns(&self, other: &CandidatePair) -> bool {
        self.debit == other.debit && self.credit == other.credit
    }

    fn values(&self, row: &[CellValue]) -> (f64, f64) {
        let read = |column: Option<usize>, side: Side| {
            column
                .and_then(|c| row.get(c))
                .map(|cell| parse_cell(cell).signed_for(side))
                .unwrap_or(0.0)
        };
        (read(self.debit, Side::Debit), read(self.credit, Side::Credit))
    }
}

fn nonzero(value: f64) -> bool {
    value.abs() > NOISE_FLOOR
}

/// Shape, source and magnitude score of one candidate's values.
pub fn score_candidate(source: CandidateSource, debit: f64, credit: f64) -> f64 {
    let shape = match (nonzero(debit), nonzero(credit)) {
        (true, true) => {
            let (small, large) = if debit.abs() < credit.abs() {
                (debit.abs(), credit.abs())
            } else {
                (credit.abs(), debit.abs())
            };
            -40.0 - 30.0 * (small / large)
        }
        (true, false) | (false, true) => 100.0,
        (false, false) => 0.0,
    };
    let magnitude = (debit.abs() + credit.abs()).ln_1p() * 0.001;
    shape + source.preference() + magnitude
}

/// Collapses a pair with both sides populated according to `policy`.
///
/// `KeepLarger` drops the smaller side outright; `Net` keeps the difference.
pub fn collapse_pair(debit: f64, credit: f64, policy: DominantSidePolicy) -> (f64, f64) {
    if !(nonzero(debit) && nonzero(credit)) {
        return (debit, credit);
    }
    match policy {
        DominantSidePolicy::KeepLarger => {
            if debit.abs() >= credit.abs() {
                (debit, 0.0)
            } else {
                (0.0, credit)
            }
        }
        DominantSidePolicy::Net => {
            let net = debit - credit;
            if net >= 0.0 {
                (net, 0.0)
            } else {
                (0.0, -net)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRow {
    pub amounts: RowAmounts,
    /// Mapped amount fields whose cell was present but not a number.
    pub invalid_fields: Vec<AmountField>,
}

#[derive(Debug, Clone)]
struct ScopeCandidates {
    mapped: CandidatePair,
    fallbacks: Vec<CandidatePair>,
}

/// Resolves rows of one sheet. Candidate columns depend only on the headers
/// and the mapping, so they are computed once.
#[derive(Debug, Clone)]
pub struct RowResolver {
    mapping: ColumnMapping,
    current: ScopeCandidates,
    previous: ScopeCandidates,
    policy: DominantSidePolicy,
}

fn qualified_pair(
    traits: &[HeaderTraits],
    years: &YearContext,
    scope: YearScope,
    qualifier: Qualifier,
    anchor: Option<usize>,
) -> (Option<usize>, Option<usize>) {
    let weights = ScoreWeights::proximity();
    let query = |side| AmountQuery {
        side,
        qualifier: Some(qualifier),
        scope: Some(scope),
    };
    let debit = best_amount_column(traits, &query(Side::Debit), years, anchor, &weights, &|_| false);
    let credit = best_amount_column(
        traits,
        &query(Side::Credit),
        years,
        debit.or(anchor),
        &weights,
        &|c| Some(c) == debit,
    );
    (debit, credit)
}

fn scope_candidates(
    traits: &[HeaderTraits],
    years: &YearContext,
    mapping: &ColumnMapping,
    scope: YearScope,
) -> ScopeCandidates {
    let (debit_field, credit_field) = match scope {
        YearScope::Current => (AmountField::Debit, AmountField::Credit),
        YearScope::Previous => (AmountField::PreviousDebit, AmountField::PreviousCredit),
    };
    let mapped = CandidatePair {
        source: CandidateSource::Mapped,
        debit: mapping.amount_column(debit_field),
        credit: mapping.amount_column(credit_field),
    };
    let anchor = mapped.debit.or(mapped.credit);

    let mut fallbacks: Vec<CandidatePair> = Vec::new();
    for (source, qualifier) in [
        (CandidateSource::Closing, Qualifier::Closing),
        (CandidateSource::Trial, Qualifier::Trial),
    ] {
        let (debit, credit) = qualified_pair(traits, years, scope, qualifier, anchor);
        let candidate = CandidatePair {
            source,
            debit,
            credit,
        };
        let duplicate = candidate.same_columns(&mapped)
            || fallbacks.iter().any(|f| f.same_columns(&candidate));
        if !candidate.is_empty() && !duplicate {
            fallbacks.push(candidate);
        }
    }

    ScopeCandidates { mapped, fallbacks }
}

impl RowResolver {
    pub fn new(headers: &[String], mapping: &ColumnMapping, policy: DominantSidePolicy) -> Self {
        let traits: Vec<HeaderTraits> = headers.iter().map(|h| classify_header(h)).collect();
        let years = YearContext::from_traits(&traits);
        Self {
            mapping: mapping.clone(),
            current: scope_candidates(&traits, &years, mapping, YearScope::Current),
            previous: scope_candidates(&traits, &years, mapping, YearScope::Previous),
            policy,
        }
    }

    fn resolve_scope(&self, row: &[CellValue], candidates: &ScopeCandidates) -> (f64, f64) {
        let mapped_values = candidates.mapped.values(row);
        let explicit = !candidates.mapped.is_empty();
        let mapped_has_value = nonzero(mapped_values.0) || nonzero(mapped_values.1);
        let fallback_values: Vec<(CandidatePair, (f64, f64))> = candidates
            .fallbacks
            .iter()
            .map(|c| (*c, c.values(row)))
            .collect();
        let fallback_has_value = fallback_values
            .iter()
            .any(|(_, (d, c))| nonzero(*d) || nonzero(*c));

        let (debit, credit) = if explicit && (mapped_has_value || !fallback_has_value) {
            mapped_values
        } else {
            let mut scored: Vec<(CandidatePair, (f64, f64))> = Vec::new();
            if explicit {
                scored.push((candidates.mapped, mapped_values));
            }
            scored.extend(fallback_values);

            let mut best: Option<(f64, (f64, f64))> = None;
            for (candidate, (d, c)) in scored {
                let score = score_candidate(candidate.source, d, c);
                if best.map_or(true, |(s, _)| score > s) {
                    best = Some((score, (d, c)));
                }
            }
            best.map(|(_, values)| values).unwrap_or((0.0, 0.0))
        };

        collapse_pair(debit, credit, self.policy)
    }

    pub fn resolve(&self, row: &[CellValue]) -> ResolvedRow {
        let mut amounts = RowAmounts::default();
        amounts.set_pair(YearScope::Current, self.resolve_scope(row, &self.current));
        amounts.set_pair(YearScope::Previous, self.resolve_scope(row, &self.previous));

        let invalid_fields = AmountField::ALL
            .into_iter()
            .filter(|field| {
                self.mapping
                    .amount_column(*field)
                    .and_then(|c| row.get(c))
                    .is_some_and(|cell| !parse_cell(cell).is_valid)
            })
            .collect();

        ResolvedRow {
            amounts,
            invalid_fields,
        }
    }
}

/// Resolves the four raw amounts of one row, before sign normalization.
pub fn resolve_row(row: &[CellValue], headers: &[String], mapping: &ColumnMapping) -> RowAmounts {
    RowResolver::new(headers, mapping, DominantSidePolicy::default())
        .resolve(row)
        .amounts
}
