use rust_xlsxwriter::{
    Color, DocProperties, ExcelDateTime, Format, FormatAlign, FormatBorder, Workbook, Worksheet,
};

use super::{
    Renderer,
    layout::{CellValue, FIRST_DATA_ROW, HEADER_ROW, MISSING, ReportLayout, is_shaded},
};
use crate::{
    EngineError, ResultEngine,
    definitions::{Alignment, DataType},
};

const ORGANIZATION_ROW: u32 = 0;
const TITLE_ROW: u32 = 1;
const STAMP_ROW: u32 = 2;

const HEADER_FILL: u32 = 0x1F4E78;
const SHADED_FILL: u32 = 0xF2F2F2;
const NUMBER_FORMAT: &str = "0.00";

/// Spreadsheet export.
#[derive(Clone, Copy, Debug, Default)]
pub struct XlsxRenderer;

impl Renderer for XlsxRenderer {
    fn render(&self, layout: &ReportLayout) -> ResultEngine<Vec<u8>> {
        let mut workbook = Workbook::new();
        // Pinned so identical inputs produce identical bytes.
        let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
        workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

        let sheet = workbook.add_worksheet();
        sheet.set_name(&layout.sheet_name)?;

        let last_col = match layout.columns.len() {
            0 => 0,
            n => u16::try_from(n - 1)
                .map_err(|_| EngineError::Render(format!("too many columns: {n}")))?,
        };

        write_titles(sheet, layout, last_col)?;
        write_body(sheet, layout)?;
        write_totals(sheet, layout)?;

        Ok(workbook.save_to_buffer()?)
    }
}

fn write_titles(sheet: &mut Worksheet, layout: &ReportLayout, last_col: u16) -> ResultEngine<()> {
    let organization = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_align(FormatAlign::Center);
    let title = Format::new()
        .set_bold()
        .set_font_size(12)
        .set_align(FormatAlign::Center);

    for (row, text, format) in [
        (ORGANIZATION_ROW, &layout.organization, &organization),
        (TITLE_ROW, &layout.title, &title),
    ] {
        if last_col == 0 {
            sheet.write_string_with_format(row, 0, text, format)?;
        } else {
            sheet.merge_range(row, 0, row, last_col, text, format)?;
        }
    }

    if let Some(stamp) = &layout.stamp {
        sheet.write_string_with_format(STAMP_ROW, 0, stamp, &Format::new().set_italic())?;
    }

    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    for (col, column) in (0u16..).zip(&layout.columns) {
        sheet.write_string_with_format(HEADER_ROW, col, &column.title, &header)?;
        if let Some(width) = column.width {
            sheet.set_column_width(col, width)?;
        }
    }
    if !layout.columns.is_empty() {
        sheet.set_freeze_panes(FIRST_DATA_ROW, 0)?;
    }
    Ok(())
}

/// Plain and shaded formats of one column.
struct ColumnFormats {
    plain: Format,
    shaded: Format,
}

impl ColumnFormats {
    fn new(data_type: DataType, alignment: Alignment, currency_symbol: &str) -> Self {
        let align = match alignment {
            Alignment::Left => FormatAlign::Left,
            Alignment::Center => FormatAlign::Center,
            Alignment::Right => FormatAlign::Right,
        };
        let mut plain = Format::new().set_border(FormatBorder::Thin).set_align(align);
        match data_type {
            DataType::Number => plain = plain.set_num_format(NUMBER_FORMAT),
            DataType::Currency => {
                plain = plain.set_num_format(currency_format(currency_symbol));
            }
            DataType::String | DataType::Date => {}
        }
        let shaded = plain.clone().set_background_color(Color::RGB(SHADED_FILL));
        Self { plain, shaded }
    }
}

fn currency_format(symbol: &str) -> String {
    format!("\"{}\"#,##0.00", symbol.replace('"', "\"\""))
}

fn write_body(sheet: &mut Worksheet, layout: &ReportLayout) -> ResultEngine<()> {
    let formats: Vec<ColumnFormats> = layout
        .columns
        .iter()
        .map(|column| ColumnFormats::new(column.data_type, column.alignment, &layout.currency_symbol))
        .collect();

    for (index, (row, cells)) in (FIRST_DATA_ROW..).zip(&layout.rows).enumerate() {
        for ((col, cell), formats) in (0u16..).zip(cells).zip(&formats) {
            let format = if is_shaded(index) {
                &formats.shaded
            } else {
                &formats.plain
            };
            write_cell(sheet, row, col, cell, format)?;
        }
    }
    Ok(())
}

fn write_totals(sheet: &mut Worksheet, layout: &ReportLayout) -> ResultEngine<()> {
    let name = Format::new().set_bold();
    let value = Format::new().set_bold().set_num_format(NUMBER_FORMAT);
    for (row, (label, cell)) in (layout.totals_row()..).zip(&layout.totals) {
        sheet.write_string_with_format(row, 0, label, &name)?;
        write_cell(sheet, row, 1, cell, &value)?;
    }
    Ok(())
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    format: &Format,
) -> ResultEngine<()> {
    match cell {
        CellValue::Number(n) | CellValue::Currency(n) => {
            sheet.write_number_with_format(row, col, *n, format)?;
        }
        CellValue::Text(text) => {
            sheet.write_string_with_format(row, col, text, format)?;
        }
        CellValue::Missing => {
            sheet.write_string_with_format(row, col, MISSING, format)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use serde_json::{Value, json};

    use super::*;
    use crate::{
        definitions::{ReportColumn, ReportDefinition},
        executor::Row,
        render::{ExportSettings, LayoutColumn},
        summary::Totals,
    };

    /// Reads one XML part of a rendered workbook.
    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    /// Style index of `cell` in a worksheet part.
    fn style_of<'a>(sheet: &'a str, cell: &str) -> &'a str {
        let marker = format!("<c r=\"{cell}\" s=\"");
        let start = sheet.find(&marker).unwrap() + marker.len();
        let len = sheet[start..].find('"').unwrap();
        &sheet[start..start + len]
    }

    fn sales_layout(width: u32) -> ReportLayout {
        let column = |field: &str, title: &str, data_type| ReportColumn {
            field_name: field.to_string(),
            display_name: title.to_string(),
            data_type,
            alignment: Alignment::Left,
            width,
            sort_order: 0,
        };
        let definition = ReportDefinition {
            code: "sales".to_string(),
            name: "Sales".to_string(),
            description: None,
            base_query: "SELECT * FROM sales".to_string(),
            calculation: None,
            sheet_name: None,
            category: None,
            sort_order: 0,
            is_public: true,
            required_permission: None,
            columns: vec![
                column("name", "Name", DataType::String),
                column("total", "Total", DataType::Currency),
            ],
            filters: Vec::new(),
        };
        let rows: Vec<Row> = [json!({ "name": "A", "total": 10 }), json!({ "name": "B", "total": 20 })]
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        let settings = ExportSettings {
            organization: "Acme".to_string(),
            ..ExportSettings::default()
        };
        ReportLayout::build(&definition, &rows, &Totals::new(), &settings, None)
    }

    #[test]
    fn lays_out_header_and_data_rows() {
        let bytes = XlsxRenderer.render(&sales_layout(140)).unwrap();
        let sheet = part(&bytes, "xl/worksheets/sheet1.xml");

        assert!(sheet.contains(r#"<mergeCell ref="A1:B1"/>"#));
        assert!(sheet.contains(r#"<mergeCell ref="A2:B2"/>"#));
        assert!(!sheet.contains(r#"<row r="3""#));
        for row in ["1", "2", "4", "5", "6"] {
            assert!(sheet.contains(&format!("<row r=\"{row}\"")), "row {row}");
        }
        assert!(!sheet.contains(r#"<row r="7""#));

        assert!(sheet.contains("<v>10</v>"));
        assert!(sheet.contains("<v>20</v>"));
        assert!(sheet.contains(r#"width="20.7109375""#));
        assert!(!sheet.contains(r#"hidden="1""#));

        // Header, plain and shaded rows each get their own style.
        assert_ne!(style_of(&sheet, "A4"), style_of(&sheet, "A5"));
        assert_ne!(style_of(&sheet, "A5"), style_of(&sheet, "A6"));
        assert_ne!(style_of(&sheet, "B5"), style_of(&sheet, "B6"));
        assert_ne!(style_of(&sheet, "A5"), style_of(&sheet, "B5"));

        let styles = part(&bytes, "xl/styles.xml");
        assert!(styles.contains(r#"formatCode="&quot;$&quot;#,##0.00""#));
        assert!(styles.contains(r#"rgb="FF1F4E78""#));
        assert!(styles.contains(r#"rgb="FFF2F2F2""#));
    }

    #[test]
    fn zero_width_columns_stay_visible() {
        let bytes = XlsxRenderer.render(&sales_layout(0)).unwrap();
        let sheet = part(&bytes, "xl/worksheets/sheet1.xml");
        assert!(!sheet.contains(r#"hidden="1""#));
        assert!(sheet.contains("<v>20</v>"));
    }

    fn layout(columns: usize) -> ReportLayout {
        let columns = (0..columns)
            .map(|i| LayoutColumn {
                title: format!("Column {i}"),
                data_type: if i == 0 { DataType::String } else { DataType::Currency },
                alignment: Alignment::Right,
                width: Some(20.0),
            })
            .collect::<Vec<_>>();
        let rows = (0..3)
            .map(|r| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, _)| match i {
                        0 => CellValue::Text(format!("row {r}")),
                        _ if r == 2 => CellValue::Missing,
                        _ => CellValue::Currency(f64::from(r) * 10.0),
                    })
                    .collect()
            })
            .collect();
        ReportLayout {
            organization: "Acme".to_string(),
            title: "Sales".to_string(),
            stamp: Some("01/01/2024 10:00".to_string()),
            sheet_name: "Sales".to_string(),
            currency_symbol: "$".to_string(),
            columns,
            rows,
            totals: vec![("sum".to_string(), CellValue::Number(10.0))],
        }
    }

    #[test]
    fn writes_a_workbook() {
        let bytes = XlsxRenderer.render(&layout(3)).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let first = XlsxRenderer.render(&layout(2)).unwrap();
        let second = XlsxRenderer.render(&layout(2)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn handles_single_and_no_columns() {
        assert!(XlsxRenderer.render(&layout(1)).is_ok());
        assert!(XlsxRenderer.render(&layout(0)).is_ok());
    }

    #[test]
    fn escapes_currency_symbol() {
        assert_eq!(currency_format("€"), "\"€\"#,##0.00");
        assert_eq!(currency_format("a\"b"), "\"a\"\"b\"#,##0.00");
    }
}
