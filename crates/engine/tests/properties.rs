// Property tests for the record filter and row merger.
// Run with: cargo test -p revsheet-engine --test properties

use proptest::prelude::*;

use revsheet_engine::{
    filter_records, merge_rows, CellValue, InputRecord, MergedRowSet, RevisionMarker, RowOrigin,
    SheetLayout, StatusTokens,
};

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn comment_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        Just("Closed".to_string()),
        Just(" close ".to_string()),
        Just("OPEN".to_string()),
        Just("Opened\t".to_string()),
        "[a-zA-Z ]{0,12}",
    ]
}

fn input_record() -> impl Strategy<Value = InputRecord> {
    ("[a-z0-9]{0,4}", comment_text()).prop_map(|(page, text)| InputRecord::new(page, text))
}

fn cell_value() -> impl Strategy<Value = CellValue> {
    prop_oneof![
        Just(CellValue::Empty),
        "[a-z]{1,6}".prop_map(CellValue::Text),
        (0u32..500).prop_map(|n| CellValue::Number(n as f64)),
        any::<bool>().prop_map(CellValue::Bool),
    ]
}

/// Previous rows always have a page cell, like rows the loader returns.
fn previous_row() -> impl Strategy<Value = Vec<CellValue>> {
    (
        prop::collection::vec(cell_value(), 2..=2),
        "[a-z0-9]{1,4}",
        prop::collection::vec(cell_value(), 1..5),
    )
        .prop_map(|(head, page, tail)| {
            let mut cells = head;
            cells.push(CellValue::Text(page));
            cells.extend(tail);
            cells
        })
}

fn merge(
    previous: Vec<Vec<CellValue>>,
    records: Vec<InputRecord>,
    marker: &str,
) -> (MergedRowSet, Vec<InputRecord>) {
    let filtered = filter_records(records, &StatusTokens::default());
    let merged = merge_rows(
        previous,
        &filtered,
        &RevisionMarker::new(marker),
        &SheetLayout::default(),
    );
    (merged, filtered)
}

// ---------------------------------------------------------------------------
// Record filter
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn filtering_is_idempotent(records in prop::collection::vec(input_record(), 0..40)) {
        let tokens = StatusTokens::default();
        let once = filter_records(records, &tokens);
        let twice = filter_records(once.clone(), &tokens);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn status_and_blank_rows_never_survive(records in prop::collection::vec(input_record(), 0..40)) {
        let kept = filter_records(records, &StatusTokens::default());
        for record in &kept {
            let folded = record.text.trim().to_lowercase();
            prop_assert!(!folded.is_empty());
            prop_assert!(!["closed", "close", "open", "opened"].contains(&folded.as_str()));
        }
    }

    #[test]
    fn filter_keeps_relative_order(records in prop::collection::vec(input_record(), 0..40)) {
        let indexed: Vec<InputRecord> = records
            .iter()
            .enumerate()
            .map(|(i, r)| InputRecord::new(format!("{i}"), r.text.clone()))
            .collect();
        let kept = filter_records(indexed, &StatusTokens::default());
        let positions: Vec<usize> = kept.iter().map(|r| r.page.parse().unwrap()).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        prop_assert_eq!(positions, sorted);
    }
}

// ---------------------------------------------------------------------------
// Row merger
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn sequence_numbers_are_contiguous(
        previous in prop::collection::vec(previous_row(), 0..10),
        records in prop::collection::vec(input_record(), 0..20),
    ) {
        let (merged, _) = merge(previous, records, "C");
        for (i, row) in merged.rows().iter().enumerate() {
            prop_assert_eq!(row.cell(1), &CellValue::Number((i + 1) as f64));
        }
    }

    #[test]
    fn previous_rows_precede_new_rows_in_source_order(
        previous in prop::collection::vec(previous_row(), 0..10),
        records in prop::collection::vec(input_record(), 0..20),
    ) {
        let previous_pages: Vec<CellValue> = previous.iter().map(|r| r[2].clone()).collect();
        let (merged, filtered) = merge(previous, records, "C");

        prop_assert_eq!(merged.len(), previous_pages.len() + filtered.len());
        let split = merged.previous_count();
        prop_assert_eq!(split, previous_pages.len());

        for (row, page) in merged.rows()[..split].iter().zip(&previous_pages) {
            prop_assert_eq!(row.origin, RowOrigin::Previous);
            prop_assert_eq!(row.cell(3), page);
        }
        for (row, record) in merged.rows()[split..].iter().zip(&filtered) {
            prop_assert_eq!(row.origin, RowOrigin::New);
            let page = if record.page.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(record.page.clone())
            };
            prop_assert_eq!(row.cell(3), &page);
            prop_assert_eq!(row.cell(4), &CellValue::Text(record.text.clone()));
        }
    }

    #[test]
    fn marker_never_touches_previous_rows(
        previous in prop::collection::vec(previous_row(), 1..10),
        records in prop::collection::vec(input_record(), 0..20),
    ) {
        let original = previous.clone();
        let (merged, _) = merge(previous, records, "Z");

        for (row, before) in merged.rows().iter().zip(&original) {
            // Columns 2.. unchanged, column 1 replaced.
            prop_assert_eq!(&row.cells[1..], &before[1..]);
            prop_assert_eq!(row.cells.len(), before.len());
        }
        for row in &merged.rows()[merged.previous_count()..] {
            prop_assert_eq!(row.cell(2), &CellValue::Text("Z".to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn status_and_blank_rows_are_dropped_before_merge() {
    let records = vec![
        InputRecord::new("p1", "Needs fix"),
        InputRecord::new("p2", "Closed"),
        InputRecord::new("p3", " "),
    ];
    let (merged, _) = merge(Vec::new(), records, "B");

    assert_eq!(merged.len(), 1);
    assert_eq!(
        merged.rows()[0].cells,
        vec![
            CellValue::Number(1.0),
            CellValue::Text("B".into()),
            CellValue::Text("p1".into()),
            CellValue::Text("Needs fix".into()),
        ]
    );
}

#[test]
fn six_column_previous_row_keeps_columns_two_to_six() {
    let row = vec![
        CellValue::Number(12.0),
        CellValue::Text("A".into()),
        CellValue::Text("p9".into()),
        CellValue::Text("comment".into()),
        CellValue::Text("response".into()),
        CellValue::Number(45000.0),
    ];
    let (merged, _) = merge(vec![row.clone()], Vec::new(), "B");

    let out = &merged.rows()[0];
    assert_eq!(out.cell(1), &CellValue::Number(1.0));
    assert_eq!(&out.cells[1..], &row[1..]);
}
