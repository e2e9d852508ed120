//! Locale tolerant amount parsing.
//!
//! Trial balance exports mix `1,234.50`, `1.234,50`, `1 234`, `(500)`,
//! `AED 1,000` and `500 CR` in the same workbook. Everything funnels through
//! [`parse_number_str`], which separates "blank" from "zero" from "garbage".
//! A `CR`/`DR` suffix does not change the sign; it names the side the amount
//! belongs to and is applied per column by [`ParsedNumber::signed_for`].

use crate::keywords::Side;
use crate::schema::CellValue;

/// Amounts at or below this magnitude are extraction noise and read as zero.
pub const NOISE_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedNumber {
    pub value: f64,
    pub is_valid: bool,
    pub is_empty: bool,
    pub suffix_side: Option<Side>,
}

impl ParsedNumber {
    fn empty() -> Self {
        Self {
            value: 0.0,
            is_valid: true,
            is_empty: true,
            suffix_side: None,
        }
    }

    fn invalid() -> Self {
        Self {
            value: 0.0,
            is_valid: false,
            is_empty: false,
            suffix_side: None,
        }
    }

    fn valid(value: f64) -> Self {
        Self {
            value,
            is_valid: true,
            is_empty: false,
            suffix_side: None,
        }
    }

    fn with_suffix(self, suffix_side: Option<Side>) -> Self {
        Self {
            suffix_side,
            ..self
        }
    }

    /// A present, well-formed number.
    pub fn is_number(&self) -> bool {
        self.is_valid && !self.is_empty
    }

    /// The value as read from a `column` side column. A suffix naming the
    /// other side flips the sign so normalization moves it across.
    pub fn signed_for(&self, column: Side) -> f64 {
        match self.suffix_side {
            Some(side) if side != column => -self.value,
            _ => self.value,
        }
    }
}

pub fn parse_cell(cell: &CellValue) -> ParsedNumber {
    match cell {
        CellValue::Empty => ParsedNumber::empty(),
        CellValue::Number(n) if n.is_finite() => ParsedNumber::valid(*n),
        CellValue::Number(_) | CellValue::Bool(_) => ParsedNumber::invalid(),
        CellValue::Text(s) => parse_number_str(s),
    }
}

pub fn parse_number_str(raw: &str) -> ParsedNumber {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();
    if compact.is_empty() {
        return ParsedNumber::empty();
    }

    let lower = compact.to_lowercase();
    let suffix_side = if has_amount_suffix(&lower, "cr") {
        Some(Side::Credit)
    } else if has_amount_suffix(&lower, "dr") {
        Some(Side::Debit)
    } else {
        None
    };

    // Currency codes, symbols and other noise go; digits, separators,
    // parentheses and signs stay.
    let kept: String = compact
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '(' | ')' | '-' | '+'))
        .collect();

    let parenthesized = match (kept.find('('), kept.rfind(')')) {
        (Some(open), Some(close)) => open < close,
        _ => false,
    };
    let unwrapped: String = kept.chars().filter(|c| *c != '(' && *c != ')').collect();

    let signed_negative = unwrapped.starts_with('-') || unwrapped.ends_with('-');
    let digits: String = unwrapped
        .chars()
        .filter(|c| *c != '-' && *c != '+')
        .collect();

    let normalized = match disambiguate_separators(&digits) {
        Some(s) => s,
        None => return ParsedNumber::invalid(),
    };

    if normalized.is_empty() || normalized == "." || normalized.matches('.').count() > 1 {
        return ParsedNumber::invalid();
    }

    let magnitude = match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => v.abs(),
        _ => return ParsedNumber::invalid(),
    };

    let negative = parenthesized || signed_negative;
    ParsedNumber::valid(if negative { -magnitude } else { magnitude }).with_suffix(suffix_side)
}

/// True when `value` ends in `suffix` right after a digit or closing paren,
/// e.g. `1,200.00cr`.
fn has_amount_suffix(value: &str, suffix: &str) -> bool {
    value
        .strip_suffix(suffix)
        .and_then(|rest| rest.trim_end_matches('.').chars().last())
        .map(|c| c.is_ascii_digit() || c == ')')
        .unwrap_or(false)
}

/// Rewrites a digits-and-separators string so that `.` is the only decimal
/// marker and thousands separators are gone.
fn disambiguate_separators(s: &str) -> Option<String> {
    let has_comma = s.contains(',');
    let has_dot = s.contains('.');

    let out = match (has_comma, has_dot) {
        (true, true) => {
            let last_comma = s.rfind(',')?;
            let last_dot = s.rfind('.')?;
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (true, false) => collapse_single_separator(s, ','),
        (false, true) if s.matches('.').count() > 1 => collapse_single_separator(s, '.'),
        _ => s.to_string(),
    };
    Some(out)
}

/// Only one kind of separator is present. It is a decimal marker when the
/// trailing group has one or two digits and every earlier group looks like a
/// thousands group; otherwise all occurrences are thousands separators.
fn collapse_single_separator(s: &str, sep: char) -> String {
    let groups: Vec<&str> = s.split(sep).collect();
    let trailing = groups.last().copied().unwrap_or("");
    let leading_ok = groups
        .first()
        .map(|g| !g.is_empty() && g.len() <= 3)
        .unwrap_or(false);
    let middle_ok = groups.len() <= 2
        || (leading_ok && groups[1..groups.len() - 1].iter().all(|g| g.len() == 3));

    if (1..=2).contains(&trailing.len()) && middle_ok {
        let whole: String = groups[..groups.len() - 1].concat();
        format!("{}.{}", whole, trailing)
    } else {
        groups.concat()
    }
}

/// Zeroes values inside the noise floor.
pub fn clamp_noise(value: f64) -> f64 {
    if value.abs() <= NOISE_FLOOR {
        0.0
    } else {
        value
    }
}

/// Amount cell value, `0.0` for blanks and unparseable text.
pub fn cell_amount(cell: &CellValue) -> f64 {
    parse_cell(cell).value
}

/// Whether a cell reads as a number rather than as a label. Text may carry a
/// currency code or a `CR`/`DR` suffix but no longer words.
pub fn is_numeric_cell(cell: &CellValue) -> bool {
    match cell {
        CellValue::Number(n) => n.is_finite(),
        CellValue::Text(s) => {
            s.chars().any(|c| c.is_ascii_digit())
                && s.chars().filter(|c| c.is_alphabetic()).count() <= 3
                && parse_number_str(s).is_number()
        }
        _ => false,
    }
}

pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(raw: &str) -> f64 {
        let parsed = parse_number_str(raw);
        assert!(parsed.is_valid, "{raw} should parse");
        parsed.value
    }

    #[test]
    fn test_blank_is_valid_and_empty() {
        assert_eq!(parse_number_str(""), ParsedNumber::empty());
        assert_eq!(parse_number_str("  \u{a0} "), ParsedNumber::empty());
        assert_eq!(parse_cell(&CellValue::Empty), ParsedNumber::empty());
    }

    #[test]
    fn test_numeric_passthrough() {
        let parsed = parse_cell(&CellValue::Number(-42.25));
        assert!(parsed.is_number());
        assert_eq!(parsed.value, -42.25);
        assert!(!parse_cell(&CellValue::Number(f64::NAN)).is_valid);
    }

    #[test]
    fn test_thousands_and_decimal_markers() {
        assert_eq!(value("1,234.50"), 1234.5);
        assert_eq!(value("1.234,50"), 1234.5);
        assert_eq!(value("1 234"), 1234.0);
        assert_eq!(value("1,234"), 1234.0);
        assert_eq!(value("12,5"), 12.5);
        assert_eq!(value("1,234,567"), 1234567.0);
        assert_eq!(value("1,234,56"), 1234.56);
        assert_eq!(value("1.234.567"), 1234567.0);
        assert_eq!(value("1.234.567,89"), 1234567.89);
        assert_eq!(value("0.75"), 0.75);
    }

    #[test]
    fn test_parenthesized_negatives() {
        assert_eq!(value("(500)"), -500.0);
        assert_eq!(value("(1,200.00)"), -1200.0);
        assert_eq!(value("-(500)"), -500.0);
    }

    #[test]
    fn test_currency_and_suffixes() {
        assert_eq!(value("AED 1,000"), 1000.0);
        assert_eq!(value("$ 99.90"), 99.9);
        assert_eq!(value("€1.000,00"), 1000.0);
        assert_eq!(value("500-"), -500.0);
        assert_eq!(value("1,200.00 CR"), 1200.0);
        assert_eq!(value("1,200.00 Dr"), 1200.0);
        assert_eq!(parse_number_str("1,200.00 CR").suffix_side, Some(Side::Credit));
        assert_eq!(parse_number_str("500dr").suffix_side, Some(Side::Debit));
        assert_eq!(parse_number_str("500").suffix_side, None);
    }

    #[test]
    fn test_suffix_side_per_column() {
        let credit = parse_number_str("1,200.00 Cr");
        assert_eq!(credit.signed_for(Side::Credit), 1200.0);
        assert_eq!(credit.signed_for(Side::Debit), -1200.0);

        let debit = parse_number_str("750 DR");
        assert_eq!(debit.signed_for(Side::Debit), 750.0);
        assert_eq!(debit.signed_for(Side::Credit), -750.0);

        assert_eq!(parse_number_str("(40)").signed_for(Side::Credit), -40.0);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(!parse_number_str("-").is_valid);
        assert!(!parse_number_str(".").is_valid);
        assert!(!parse_number_str("n/a").is_valid);
        assert_eq!(value("1.2.3.4.5"), 12345.0);
        assert!(!parse_cell(&CellValue::Bool(true)).is_valid);
    }

    #[test]
    fn test_is_numeric_cell() {
        assert!(is_numeric_cell(&CellValue::from("1,000")));
        assert!(is_numeric_cell(&CellValue::Number(3.0)));
        assert!(is_numeric_cell(&CellValue::from("USD 12.00")));
        assert!(!is_numeric_cell(&CellValue::from("Debit")));
        assert!(!is_numeric_cell(&CellValue::from("Cash 1001")));
        assert!(!is_numeric_cell(&CellValue::Empty));
    }

    #[test]
    fn test_clamp_and_round() {
        assert_eq!(clamp_noise(0.009), 0.0);
        assert_eq!(clamp_noise(-0.01), 0.0);
        assert_eq!(clamp_noise(0.02), 0.02);
        assert_eq!(round2(10.005_1), 10.01);
        assert_eq!(round2(-0.001), 0.0);
    }
}
