//! Renderer-independent model of an export.
//!
//! ```text
//! row 0  organization name        (merged across all columns)
//! row 1  report name              (merged across all columns)
//! row 2  spacer, optional stamp
//! row 3  column headers
//! row 4+ data rows, odd zero-based indexes shaded
//! ```

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{
    ExportSettings,
    format::{Amount, DateStyle, as_number, raw_text},
};
use crate::{
    definitions::{Alignment, DataType, ReportColumn, ReportDefinition},
    executor::Row,
    summary::Totals,
};

/// Placeholder written for missing values.
pub const MISSING: &str = "-";

/// Zero-based row of the column headers.
pub const HEADER_ROW: u32 = 3;

/// Zero-based row of the first data row.
pub const FIRST_DATA_ROW: u32 = HEADER_ROW + 1;

/// Width of one character unit in pixels.
pub const PIXELS_PER_CHAR: f64 = 7.0;

/// Excel's sheet name limit.
const MAX_SHEET_NAME: usize = 31;

/// One typed body cell.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Currency(f64),
    Missing,
}

impl CellValue {
    /// Builds the cell of a column of type `data_type`.
    fn typed(data_type: DataType, value: Option<&Value>, dates: &DateStyle<'_>) -> Self {
        let value = match value {
            None | Some(Value::Null) => return CellValue::Missing,
            Some(value) => value,
        };
        match data_type {
            DataType::String => CellValue::Text(raw_text(value)),
            DataType::Number => as_number(value)
                .map_or_else(|| CellValue::Text(raw_text(value)), CellValue::Number),
            DataType::Currency => as_number(value)
                .map_or_else(|| CellValue::Text(raw_text(value)), CellValue::Currency),
            DataType::Date => CellValue::Text(dates.cell(value).unwrap_or_else(|| raw_text(value))),
        }
    }

    /// Builds the cell of a total, which carries no column type.
    fn total(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Missing,
            Value::Number(n) => n.as_f64().map_or(CellValue::Missing, CellValue::Number),
            other => CellValue::Text(raw_text(other)),
        }
    }

    /// Text form of the cell, as written by text renderers.
    #[must_use]
    pub fn text(&self, currency_symbol: &str) -> String {
        match self {
            CellValue::Text(text) => text.clone(),
            CellValue::Number(n) => format!("{n:.2}"),
            CellValue::Currency(n) => match Amount::from_f64(*n) {
                Some(amount) => amount.display(currency_symbol).to_string(),
                None => format!("{n:.2}"),
            },
            CellValue::Missing => MISSING.to_string(),
        }
    }
}

/// Column as laid out on export.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutColumn {
    pub title: String,
    pub data_type: DataType,
    pub alignment: Alignment,
    /// Width in character units, `None` to keep the default width.
    pub width: Option<f64>,
}

impl From<&ReportColumn> for LayoutColumn {
    fn from(column: &ReportColumn) -> Self {
        Self {
            title: column.display_name.clone(),
            data_type: column.data_type,
            alignment: column.alignment,
            // A zero width would hide the column.
            width: (column.width > 0).then(|| f64::from(column.width) / PIXELS_PER_CHAR),
        }
    }
}

/// Everything a renderer needs, already typed and formatted.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportLayout {
    pub organization: String,
    pub title: String,
    /// Spacer row text, empty when no stamp was requested.
    pub stamp: Option<String>,
    pub sheet_name: String,
    pub currency_symbol: String,
    pub columns: Vec<LayoutColumn>,
    pub rows: Vec<Vec<CellValue>>,
    /// `(name, value)` pairs in key order; empty unless totals are enabled.
    pub totals: Vec<(String, CellValue)>,
}

impl ReportLayout {
    pub fn build(
        definition: &ReportDefinition,
        rows: &[Row],
        totals: &Totals,
        settings: &ExportSettings,
        generated_at: Option<DateTime<Utc>>,
    ) -> Self {
        let dates = settings.date_style();

        let body: Vec<Vec<CellValue>> = rows
            .iter()
            .map(|row| {
                definition
                    .columns
                    .iter()
                    .map(|column| CellValue::typed(column.data_type, row.get(&column.field_name), &dates))
                    .collect()
            })
            .collect();

        let mut totals: Vec<(String, CellValue)> = if settings.include_totals {
            totals
                .iter()
                .map(|(name, value)| (name.clone(), CellValue::total(value)))
                .collect()
        } else {
            Vec::new()
        };
        totals.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            organization: settings.organization.clone(),
            title: definition.name.clone(),
            stamp: generated_at.and_then(|at| dates.instant(&at)),
            sheet_name: sheet_name(definition),
            currency_symbol: settings.currency_symbol.clone(),
            columns: definition.columns.iter().map(LayoutColumn::from).collect(),
            rows: body,
            totals,
        }
    }

    /// Zero-based row of the first totals line.
    #[must_use]
    pub fn totals_row(&self) -> u32 {
        let rows = u32::try_from(self.rows.len()).unwrap_or(u32::MAX);
        FIRST_DATA_ROW.saturating_add(rows).saturating_add(1)
    }
}

/// Whether the data row at zero-based `index` is shaded.
#[must_use]
pub const fn is_shaded(index: usize) -> bool {
    index % 2 == 1
}

/// Worksheet name: `sheet_name`, else the report name, made valid for Excel.
fn sheet_name(definition: &ReportDefinition) -> String {
    [definition.sheet_name.as_deref(), Some(definition.name.as_str())]
        .into_iter()
        .flatten()
        .map(sanitize_sheet_name)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "Report".to_string())
}

fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();
    cleaned.trim_matches('\'').trim().to_string()
}
