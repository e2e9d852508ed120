//! Header row detection and composite header assembly.

use crate::keywords::{classify_header, normalize_header, year_from_token, HeaderTraits};
use crate::numeric::is_numeric_cell;
use crate::schema::{CellValue, SheetFrame};
use log::{debug, info};

/// Only this many non-blank rows from the top are considered as headers.
pub const MAX_SCAN_ROWS: usize = 80;

/// Rows above and below the detected header searched for composite parts.
pub const COMPOSITE_WINDOW: usize = 6;

const MIN_HEADER_SCORE: f64 = 7.0;
const MIN_KEYWORD_CATEGORIES: usize = 2;
const LOOKAHEAD_ROWS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderScore {
    pub row: usize,
    pub score: f64,
    pub keyword_categories: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeHeaders {
    pub headers: Vec<String>,
    pub data_start_index: usize,
}

fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}

fn is_alphabetic_cell(cell: &CellValue) -> bool {
    matches!(cell, CellValue::Text(s) if s.chars().any(char::is_alphabetic))
}

fn row_traits(row: &[CellValue]) -> Vec<HeaderTraits> {
    row.iter()
        .filter(|c| !c.is_blank())
        .map(|c| classify_header(&c.display_text()))
        .collect()
}

/// Scores one row as a header candidate.
pub fn score_header_row(rows: &[Vec<CellValue>], index: usize) -> HeaderScore {
    let row = &rows[index];
    let non_blank: Vec<&CellValue> = row.iter().filter(|c| !c.is_blank()).collect();
    let mut score = 0.0;

    for cell in &non_blank {
        if is_alphabetic_cell(cell) {
            score += 0.5;
        }
        if is_numeric_cell(cell) {
            score -= 2.0;
        }
    }
    if non_blank.iter().any(|c| c.display_text().chars().count() > 60) {
        score -= 1.5;
    }
    match non_blank.len() {
        1 => score -= 4.0,
        2..=12 => score += 2.0,
        _ => {}
    }

    let traits = row_traits(row);
    let account = traits.iter().any(|t| t.account);
    let category = traits.iter().any(|t| t.category);
    let debit = traits.iter().any(|t| t.debit);
    let credit = traits.iter().any(|t| t.credit);

    if account {
        score += 6.0;
    }
    if category {
        score += 4.0;
    }
    if debit {
        score += 5.0;
    }
    if credit {
        score += 5.0;
    }
    if account && (debit || credit) {
        score += 3.0;
    }
    if debit && credit {
        score += 2.0;
    }

    let following_data_rows = rows
        .iter()
        .skip(index + 1)
        .filter(|r| !is_blank_row(r))
        .take(LOOKAHEAD_ROWS)
        .filter(|r| r.iter().any(is_numeric_cell) && r.iter().any(is_alphabetic_cell))
        .count();
    score += following_data_rows as f64;

    let keyword_categories = [account, category, debit, credit]
        .iter()
        .filter(|hit| **hit)
        .count();

    HeaderScore {
        row: index,
        score,
        keyword_categories,
    }
}

/// Index of the most likely header row, or `None` when no row is convincing.
pub fn detect_header_row(rows: &[Vec<CellValue>]) -> Option<usize> {
    let mut best: Option<HeaderScore> = None;

    for index in (0..rows.len())
        .filter(|&i| !is_blank_row(&rows[i]))
        .take(MAX_SCAN_ROWS)
    {
        let candidate = score_header_row(rows, index);
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    let best = best?;
    debug!(
        "Best header candidate is row {} (score {:.1}, {} keyword categories)",
        best.row, best.score, best.keyword_categories
    );

    if best.keyword_categories >= MIN_KEYWORD_CATEGORIES && best.score >= MIN_HEADER_SCORE {
        Some(best.row)
    } else {
        None
    }
}

/// Excel-style column letter: 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

pub fn synthetic_headers(column_count: usize) -> Vec<String> {
    (0..column_count)
        .map(|i| format!("Column {}", column_letter(i)))
        .collect()
}

fn cell_text(rows: &[Vec<CellValue>], row: usize, column: usize) -> String {
    rows.get(row)
        .and_then(|r| r.get(column))
        .map(CellValue::display_text)
        .unwrap_or_default()
}

fn is_year_cell(cell: &CellValue) -> bool {
    let normalized = normalize_header(&cell.display_text());
    let tokens: Vec<&str> = normalized.split(' ').collect();
    tokens.iter().any(|t| year_from_token(t).is_some() || *t == "fy")
        || (tokens.contains(&"year")
            && tokens
                .iter()
                .any(|t| matches!(*t, "current" | "this" | "previous" | "prior" | "last")))
}

fn debit_credit_density(row: &[CellValue]) -> usize {
    row_traits(row).iter().filter(|t| t.is_amount()).count()
}

/// The row holding Debit/Credit labels: densest in the window, then
/// closest to the detected header, then the upper of two equidistant rows.
fn find_child_row(rows: &[Vec<CellValue>], anchor: usize, lo: usize, hi: usize) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for index in lo..=hi {
        let row = &rows[index];
        if row.iter().any(is_numeric_cell) {
            continue;
        }
        let density = debit_credit_density(row);
        if density == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((current, current_density)) => {
                let distance = index.abs_diff(anchor);
                let current_distance = current.abs_diff(anchor);
                density > current_density
                    || (density == current_density && distance < current_distance)
            }
        };
        if better {
            best = Some((index, density));
        }
    }
    best.map(|(index, _)| index)
}

/// The nearest row above `child` made of year labels. Each year cell has to
/// sit over a Debit/Credit column and any other text has to be a column
/// label, so metadata such as `Period | 2024` never qualifies.
fn find_year_row(rows: &[Vec<CellValue>], lo: usize, child: usize) -> Option<usize> {
    let amount_columns: Vec<bool> = rows[child]
        .iter()
        .map(|c| classify_header(&c.display_text()).is_amount())
        .collect();

    (lo..child).rev().find(|&index| {
        let row = &rows[index];
        let cells: Vec<(usize, &CellValue)> = row
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_blank())
            .collect();
        // A lone first-column cell is a title such as "Year ended 2024".
        let title_only = cells.len() == 1 && cells[0].0 == 0;
        let year_columns: Vec<usize> = cells
            .iter()
            .filter(|(_, c)| is_year_cell(c))
            .map(|(column, _)| *column)
            .collect();

        !title_only
            && !year_columns.is_empty()
            && year_columns
                .iter()
                .all(|&column| amount_columns.get(column).copied().unwrap_or(false))
            && cells.iter().all(|(_, c)| {
                is_year_cell(c) || is_label_cell(&classify_header(&c.display_text()))
            })
            && debit_credit_density(row) == 0
    })
}

fn is_label_cell(traits: &HeaderTraits) -> bool {
    traits.account || traits.category || traits.name || traits.code
}

fn is_qualifier_cell(traits: &HeaderTraits) -> bool {
    traits.closing || traits.trial || traits.opening
}

fn find_label_row(
    rows: &[Vec<CellValue>],
    lo: usize,
    child: usize,
    year_row: Option<usize>,
) -> Option<usize> {
    (lo..child).rev().find(|&index| {
        if Some(index) == year_row {
            return false;
        }
        let row = &rows[index];
        let non_blank = row.iter().filter(|c| !c.is_blank()).count();
        let traits = row_traits(row);
        non_blank >= 2
            && !row.iter().any(is_numeric_cell)
            && traits.iter().any(|t| is_label_cell(t) || is_qualifier_cell(t))
    })
}

/// Forward-fills non-blank cells of `row` across `column_count` columns.
fn forward_fill(rows: &[Vec<CellValue>], row: usize, column_count: usize) -> Vec<Option<String>> {
    let mut current: Option<String> = None;
    (0..column_count)
        .map(|column| {
            let text = cell_text(rows, row, column);
            if !text.is_empty() {
                current = Some(text);
            }
            current.clone()
        })
        .collect()
}

/// Builds one flat header per column from the detected header row and any
/// year, label and Debit/Credit rows around it.
pub fn build_composite_headers(
    rows: &[Vec<CellValue>],
    row_index: usize,
    column_count: usize,
) -> CompositeHeaders {
    if rows.is_empty() || row_index >= rows.len() {
        return CompositeHeaders {
            headers: synthetic_headers(column_count),
            data_start_index: 0,
        };
    }

    let lo = row_index.saturating_sub(COMPOSITE_WINDOW);
    let hi = (row_index + COMPOSITE_WINDOW).min(rows.len() - 1);

    let child = find_child_row(rows, row_index, lo, hi).unwrap_or(row_index);
    let year_row = find_year_row(rows, lo, child);
    let label_row = find_label_row(rows, lo, child, year_row);

    debug!(
        "Composite header: child row {}, year row {:?}, label row {:?}",
        child, year_row, label_row
    );

    let year_fill = year_row.map(|r| forward_fill(rows, r, column_count));
    let qualifier_fill = label_row.map(|r| {
        forward_fill(rows, r, column_count)
            .into_iter()
            .map(|label| label.filter(|l| is_qualifier_cell(&classify_header(l))))
            .collect::<Vec<_>>()
    });

    let headers = (0..column_count)
        .map(|column| {
            let child_text = cell_text(rows, child, column);
            let is_amount = classify_header(&child_text).is_amount();
            let mut parts: Vec<String> = Vec::new();

            if let (Some(r), Some(fill)) = (year_row, &year_fill) {
                let direct = cell_text(rows, r, column);
                if !direct.is_empty() {
                    parts.push(direct);
                } else if is_amount {
                    if let Some(year) = &fill[column] {
                        parts.push(year.clone());
                    }
                }
            }

            if let Some(r) = label_row {
                if is_amount {
                    if let Some(Some(qualifier)) = qualifier_fill.as_ref().map(|f| &f[column]) {
                        parts.push(qualifier.clone());
                    }
                } else {
                    let label = cell_text(rows, r, column);
                    if !label.is_empty() {
                        parts.push(label);
                    }
                }
            }

            if !child_text.is_empty() {
                parts.push(child_text);
            }

            let mut seen: Vec<String> = Vec::new();
            let mut flat: Vec<String> = Vec::new();
            for part in parts {
                let key = normalize_header(&part);
                if key.is_empty() || seen.contains(&key) {
                    continue;
                }
                seen.push(key);
                flat.push(part);
            }

            if flat.is_empty() {
                format!("Column {}", column_letter(column))
            } else {
                flat.join(" ")
            }
        })
        .collect();

    let highest_used = [Some(row_index), Some(child), year_row, label_row]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(row_index);

    CompositeHeaders {
        headers,
        data_start_index: highest_used + 1,
    }
}

/// Turns raw sheet rows into a [`SheetFrame`]: detect the header, assemble
/// composite headers and keep every non-blank row after them as data. Without
/// a confident header all non-blank rows are data under `Column A, B, ...`.
pub fn frame_from_rows(
    sheet_names: Vec<String>,
    active_sheet: impl Into<String>,
    rows: &[Vec<CellValue>],
) -> SheetFrame {
    let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    let header_row = detect_header_row(rows);

    let (headers, data_start) = match header_row {
        Some(index) => {
            let composite = build_composite_headers(rows, index, column_count);
            info!(
                "Detected header at row {}; data starts at row {}",
                index, composite.data_start_index
            );
            (composite.headers, composite.data_start_index)
        }
        None => {
            info!("No confident header row; using synthetic column names");
            (synthetic_headers(column_count), 0)
        }
    };

    let data_rows: Vec<Vec<CellValue>> = rows
        .iter()
        .skip(data_start)
        .filter(|r| !is_blank_row(r))
        .cloned()
        .collect();

    SheetFrame {
        sheet_names,
        active_sheet: active_sheet.into(),
        headers,
        rows: data_rows,
        header_row,
    }
}
