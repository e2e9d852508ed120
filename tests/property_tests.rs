use proptest::prelude::*;
use trial_balance_importer::ledger::note_totals;
use trial_balance_importer::numeric::parse_number_str;
use trial_balance_importer::resolver::collapse_pair;
use trial_balance_importer::*;

fn money() -> impl Strategy<Value = f64> {
    (-10_000_000i64..10_000_000).prop_map(|cents| cents as f64 / 100.0)
}

fn positive_money() -> impl Strategy<Value = f64> {
    (0i64..10_000_000).prop_map(|cents| cents as f64 / 100.0)
}

fn amounts() -> impl Strategy<Value = RowAmounts> {
    (positive_money(), positive_money(), positive_money(), positive_money()).prop_map(
        |(debit, credit, previous_debit, previous_credit)| RowAmounts {
            debit,
            credit,
            previous_debit,
            previous_credit,
        },
    )
}

fn policy() -> impl Strategy<Value = DominantSidePolicy> {
    prop_oneof![
        Just(DominantSidePolicy::KeepLarger),
        Just(DominantSidePolicy::Net)
    ]
}

fn field() -> impl Strategy<Value = AmountField> {
    proptest::sample::select(AmountField::ALL.to_vec())
}

fn scope() -> impl Strategy<Value = YearScope> {
    prop_oneof![Just(YearScope::Current), Just(YearScope::Previous)]
}

fn with_thousands(whole: u64) -> String {
    let digits = whole.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

const HEADER_WORDS: [&str; 12] = [
    "Account", "Debit", "Credit", "Dr", "Cr", "2024", "2023", "Closing", "Category", "Bank",
    "1,250.00", "",
];

#[derive(Debug, Clone)]
enum Edit {
    Cell(AmountField, f64),
    Notes(Vec<(f64, f64, YearScope)>),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (field(), positive_money()).prop_map(|(f, v)| Edit::Cell(f, v)),
        proptest::collection::vec((positive_money(), positive_money(), scope()), 0..4)
            .prop_map(Edit::Notes),
    ]
}

fn effective_base(ledger: &Ledger, account: &str) -> RowAmounts {
    let row = ledger.row(account).expect("row exists");
    row.base()
        .unwrap_or_else(|| row.amounts() - note_totals(ledger.notes_for(account)))
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn formatted_amounts_parse_back(cents in 0u64..100_000_000_000, negative in any::<bool>()) {
        let whole = cents / 100;
        let text = format!("{}.{:02}", with_thousands(whole), cents % 100);
        let text = if negative { format!("({})", text) } else { text };
        let expected = cents as f64 / 100.0 * if negative { -1.0 } else { 1.0 };

        let parsed = parse_number_str(&text);
        prop_assert!(parsed.is_valid);
        prop_assert!(!parsed.is_empty);
        prop_assert!((parsed.value - expected).abs() < 1e-6, "{} -> {}", text, parsed.value);
    }

    #[test]
    fn normalized_pairs_have_one_nonnegative_side(
        debit in money(),
        credit in money(),
        policy in policy(),
    ) {
        let (debit, credit) = collapse_pair(debit, credit, policy);
        let (debit, credit) = normalize_pair(debit, credit);
        prop_assert!(debit >= 0.0 && credit >= 0.0);
        prop_assert!(debit == 0.0 || credit == 0.0, "both sides set: {} / {}", debit, credit);
    }

    #[test]
    fn header_detection_is_deterministic(
        grid in proptest::collection::vec(
            proptest::collection::vec(proptest::sample::select(HEADER_WORDS.to_vec()), 1..6),
            0..12,
        )
    ) {
        let rows: Vec<Vec<CellValue>> = grid
            .iter()
            .map(|r| r.iter().map(|c| CellValue::from(*c)).collect())
            .collect();
        let first = detect_header_row(&rows);
        prop_assert_eq!(detect_header_row(&rows), first);

        let a = frame_from_rows(vec!["S".into()], "S", &rows);
        let b = frame_from_rows(vec!["S".into()], "S", &rows);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn current_only_is_idempotent(amounts in amounts(), both in any::<bool>()) {
        for mode in [ImportMode::Auto, ImportMode::CurrentOnly, ImportMode::PreviousOnly] {
            let once = reconcile_year_mode(amounts, mode, both);
            let twice = reconcile_year_mode(once, mode, both);
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn displayed_equals_base_plus_notes(
        start in amounts(),
        edits in proptest::collection::vec(edit(), 1..10),
    ) {
        let (mut ledger, _) = Ledger::new().upsert(
            &[
                ImportedRow::new("Bank", None, start),
                ImportedRow::new("Capital", None, RowAmounts { credit: 10.0, ..Default::default() }),
            ],
            &ImportOptions::default(),
        );

        for edit in edits {
            let base_before = effective_base(&ledger, "Bank");
            let notes_before = ledger.notes_for("Bank").to_vec();

            ledger = match &edit {
                Edit::Cell(field, value) => ledger.with_cell_edit("Bank", *field, *value).unwrap(),
                Edit::Notes(lines) => {
                    let notes = lines
                        .iter()
                        .enumerate()
                        .map(|(i, (d, c, s))| WorkingNote::new(format!("Adj {}", i), *d, *c, *s))
                        .collect();
                    ledger.with_notes("Bank", notes).unwrap()
                }
            };

            match &edit {
                Edit::Cell(..) => prop_assert_eq!(ledger.notes_for("Bank"), notes_before.as_slice()),
                Edit::Notes(_) => {
                    let base_after = effective_base(&ledger, "Bank");
                    for f in AmountField::ALL {
                        prop_assert!(close(base_after.get(f), base_before.get(f)));
                    }
                }
            }

            let row = ledger.row("Bank").unwrap();
            let expected = effective_base(&ledger, "Bank") + note_totals(ledger.notes_for("Bank"));
            for f in AmountField::ALL {
                prop_assert!(close(row.amounts().get(f), expected.get(f)));
            }
        }
    }

    #[test]
    fn totals_match_sum_of_rows(
        batch in proptest::collection::vec(
            (proptest::sample::select(vec!["Bank", "Rent", "Sales", "Capital", "bank"]), amounts()),
            0..12,
        ),
        grouping in any::<bool>(),
        delete_rent in any::<bool>(),
    ) {
        let rows: Vec<ImportedRow> = batch
            .into_iter()
            .map(|(name, amounts)| ImportedRow::new(name, None, amounts))
            .collect();
        let options = ImportOptions {
            group_duplicates_to_notes: grouping,
            ..Default::default()
        };
        let (mut ledger, _) = Ledger::new().upsert(&rows, &options);
        if delete_rent && ledger.row("Rent").is_some() {
            ledger = ledger.delete_account("Rent").unwrap();
        }

        let sum = ledger
            .accounts()
            .fold(RowAmounts::default(), |acc, r| acc + r.amounts());
        let totals = ledger.totals();
        for f in AmountField::ALL {
            prop_assert!((totals.get(f) - sum.get(f)).abs() <= 0.005 + 1e-9);
        }
        prop_assert_eq!(ledger.rows().iter().filter(|r| r.is_totals()).count(), 1);
    }
}
