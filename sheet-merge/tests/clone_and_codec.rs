mod common;

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use pretty_assertions::assert_eq;
use sheet_merge::merge::{
    CollisionPolicy, ExportModel, IndicatorValues, MergeKind, Merger, Rating, RowLayout,
    apply_layout, clone_sheet, clone_sheet_with,
};
use sheet_merge::xlsx::worksheet::Orientation;
use sheet_merge::xlsx::{CellRange, CellRef, Sheet, Workbook};
use sheet_merge::{ErrorKind, MergeConfig};

use common::{TEMPLATE_CONDITIONAL_RULES, TEMPLATE_MERGES, template_workbook};

fn rule_count(sheet: &Sheet) -> usize {
    sheet.conditional_formats.iter().map(|c| c.rules.len()).sum()
}

fn assert_same_structure(copy: &Sheet, template: &Sheet) {
    assert_eq!(copy.merged, template.merged);
    assert_eq!(copy.columns, template.columns);
    assert_eq!(copy.hidden_columns(), template.hidden_columns());
    assert_eq!(copy.conditional_formats, template.conditional_formats);
    assert_eq!(copy.validations, template.validations);
    assert_eq!(copy.page_margins, template.page_margins);
    for row in 1..=3 {
        assert_eq!(copy.rows[&row].height, template.rows[&row].height, "row {row}");
    }
}

#[test]
fn test_clone_scenario_keeps_header_and_layout() {
    let mut workbook = Workbook::parse(&template_workbook()).unwrap();
    let template = workbook.sheet("Template").unwrap().clone();

    clone_sheet(&mut workbook, "Template", "Report_11.2025").unwrap();
    let reopened = Workbook::parse(&workbook.serialize().unwrap()).unwrap();
    let copy = reopened.sheet("Report_11.2025").unwrap();

    assert!(copy.is_merged(&CellRange::parse("A1:B1").unwrap()));
    assert_eq!(copy.merged.len(), TEMPLATE_MERGES);
    assert_eq!(copy.rows[&1].height, Some(28.0));
    assert_same_structure(copy, &template);

    let a1 = copy.cell(CellRef::new(1, 1)).unwrap();
    let style = reopened.styles().cell_style(a1.style).unwrap();
    let font = style.font.unwrap();
    assert!(font.bold);
    assert_eq!(font.color.as_ref().and_then(|c| c.rgb.as_deref()), Some("FFFF0000"));
    assert_eq!(
        reopened.cell_text("Report_11.2025", CellRef::new(1, 1)).as_deref(),
        Some("Teacher Observation")
    );
}

#[test]
fn test_clone_is_complete() {
    let mut workbook = Workbook::parse(&template_workbook()).unwrap();
    let template = workbook.sheet("Template").unwrap().clone();
    let copy = clone_sheet(&mut workbook, "Template", "03.2025").unwrap();

    assert_eq!(rule_count(copy), TEMPLATE_CONDITIONAL_RULES);
    assert!(copy.conditional_formats.iter().all(|c| c.sqref == "C6:C30"));
    assert!(copy.hidden_columns().contains(&7));
    assert_eq!(
        copy.validation_at(CellRef::new(10, 3)).unwrap().allowed_values(),
        vec!["1", "2", "3", "4"]
    );
    assert_eq!(
        copy.page_setup.as_ref().and_then(|s| s.orientation()),
        Some(Orientation::Landscape)
    );
    // Styled blanks are cloned with their format.
    assert_eq!(
        copy.cell(CellRef::new(30, 5)).map(|c| c.style),
        template.cell(CellRef::new(30, 5)).map(|c| c.style)
    );
}

#[test]
fn test_round_trip_keeps_every_sheet() {
    let original = Workbook::parse(&template_workbook()).unwrap();
    let again = Workbook::parse(&original.serialize().unwrap()).unwrap();

    assert_eq!(original.sheet_names(), again.sheet_names());
    for name in original.sheet_names() {
        assert_eq!(original.sheet(name), again.sheet(name), "{name}");
    }
    assert_eq!(
        original.styles().cell_format_count(),
        again.styles().cell_format_count()
    );
}

#[test]
fn test_merge_leaves_other_sheets_alone() {
    let original = Workbook::parse(&template_workbook()).unwrap();
    let mut workbook = original.clone();

    clone_sheet(&mut workbook, "Template", "03.2025").unwrap();
    let model = ExportModel::default().with_indicator(
        "1a",
        IndicatorValues {
            rating: Some(Rating::Score(2.0)),
            ..IndicatorValues::default()
        },
    );
    apply_layout(&mut workbook, "03.2025", &RowLayout::teacher(), &model).unwrap();
    let reopened = Workbook::parse(&workbook.serialize().unwrap()).unwrap();

    for name in ["Template", "Admin Template", "Notes"] {
        assert_eq!(reopened.sheet(name), original.sheet(name), "{name}");
    }
    let names = reopened.defined_names().unwrap();
    assert!(names.iter().any(|n| n.formula == "'03.2025'!$A$1:$E$30"));
    assert!(names.iter().any(|n| n.formula == "Template!$A$1:$E$30"));
}

#[test]
fn test_collision_policies() {
    let mut workbook = Workbook::parse(&template_workbook()).unwrap();
    let err = clone_sheet(&mut workbook, "Template", "NOTES").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SheetExists);

    let name =
        clone_sheet_with(&mut workbook, "Template", "Notes", CollisionPolicy::Suffix).unwrap();
    assert_eq!(name, "Notes (2)");
}

#[test]
fn test_third_party_reader_sees_merged_values() {
    let merger = Merger::new(
        sheet_merge::GraphClient::new(&MergeConfig::testing()).unwrap(),
        MergeConfig::testing(),
    );
    let model = ExportModel::from_json(
        r#"{
            "header": {"teacher_name": "Jane Doe", "observation_date": "2025-03-14"},
            "indicators": {
                "1a": {"rating": 3, "strengths": "Clear learning targets"},
                "4f": {"growth": "Share rubric earlier"}
            }
        }"#,
    )
    .unwrap();

    let merged = merger
        .merge_bytes(&template_workbook(), MergeKind::Teacher, None, "03.2025", &model)
        .unwrap();
    assert_eq!(merged.report.written_cells, 5);

    let mut reader: Xlsx<_> = open_workbook_from_rs(Cursor::new(merged.bytes)).unwrap();
    assert_eq!(
        reader.sheet_names(),
        vec!["Template", "Admin Template", "Notes", "03.2025"]
    );
    let range = reader.worksheet_range("03.2025").unwrap();
    assert_eq!(range.get_value((5, 2)), Some(&Data::Float(3.0)));
    assert_eq!(
        range.get_value((5, 3)),
        Some(&Data::String("Clear learning targets".to_string()))
    );
    assert_eq!(
        range.get_value((29, 4)),
        Some(&Data::String("Share rubric earlier".to_string()))
    );
    assert_eq!(range.get_value((1, 1)), Some(&Data::String("Jane Doe".to_string())));
    assert_eq!(range.get_value((5, 0)), Some(&Data::String("1a".to_string())));

    let notes = reader.worksheet_range("Notes").unwrap();
    assert_eq!(notes.get_value((1, 0)), Some(&Data::Float(42.0)));
}
