use ::csv::WriterBuilder;

use super::{Renderer, layout::ReportLayout};
use crate::{EngineError, ResultEngine};

/// Flat text export: the header row, then one record per data row.
///
/// Title lines and shading have no text counterpart; totals, when enabled,
/// follow as `name,value` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvRenderer;

impl Renderer for CsvRenderer {
    fn render(&self, layout: &ReportLayout) -> ResultEngine<Vec<u8>> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

        writer.write_record(layout.columns.iter().map(|column| column.title.as_str()))?;
        for row in &layout.rows {
            writer.write_record(row.iter().map(|cell| cell.text(&layout.currency_symbol)))?;
        }
        for (name, value) in &layout.totals {
            writer.write_record([name.clone(), value.text(&layout.currency_symbol)])?;
        }

        writer
            .into_inner()
            .map_err(|err| EngineError::Render(err.to_string()))
    }
}
