//! Document generator.
//!
//! A [`ReportLayout`] is built once from the definition, the rows and the
//! totals; each [`Renderer`] turns it into the bytes of one export format.

use std::{fmt, str::FromStr};

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;

use crate::{EngineError, ResultEngine};

mod csv;
mod format;
mod layout;
mod xlsx;

pub use self::{
    csv::CsvRenderer,
    format::{Amount, AmountDisplay},
    layout::{CellValue, LayoutColumn, ReportLayout},
    xlsx::XlsxRenderer,
};
pub(crate) use self::format::as_number;
use self::format::DateStyle;

/// Turns a layout into a document.
pub trait Renderer {
    fn render(&self, layout: &ReportLayout) -> ResultEngine<Vec<u8>>;
}

/// Supported export formats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    /// Renders `layout` with the renderer of this format.
    pub fn render(self, layout: &ReportLayout) -> ResultEngine<Vec<u8>> {
        match self {
            ExportFormat::Xlsx => XlsxRenderer.render(layout),
            ExportFormat::Csv => CsvRenderer.render(layout),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(EngineError::Config(format!("unsupported export format: {other}"))),
        }
    }
}

/// Branding and formatting applied to every export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSettings {
    /// First title line of the spreadsheet.
    pub organization: String,
    pub currency_symbol: String,
    /// strftime pattern for date-time cells and the stamp.
    pub date_format: String,
    /// strftime pattern for date-only cells.
    pub date_only_format: String,
    pub timezone: Tz,
    /// Append the totals below the data rows.
    pub include_totals: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            organization: String::new(),
            currency_symbol: "$".to_string(),
            date_format: "%d/%m/%Y %H:%M".to_string(),
            date_only_format: "%d/%m/%Y".to_string(),
            timezone: Tz::UTC,
            include_totals: false,
        }
    }
}

impl ExportSettings {
    /// Sets the timezone from its IANA name.
    pub fn with_timezone(mut self, name: &str) -> ResultEngine<Self> {
        self.timezone = name
            .trim()
            .parse::<Tz>()
            .map_err(|err| EngineError::Config(format!("invalid timezone {name:?}: {err}")))?;
        Ok(self)
    }

    /// Sets the date-time pattern, rejecting patterns chrono cannot format.
    pub fn with_date_format(mut self, pattern: &str) -> ResultEngine<Self> {
        self.date_format = checked_pattern(pattern)?;
        Ok(self)
    }

    /// Sets the date-only pattern, rejecting patterns chrono cannot format.
    pub fn with_date_only_format(mut self, pattern: &str) -> ResultEngine<Self> {
        self.date_only_format = checked_pattern(pattern)?;
        Ok(self)
    }

    pub(crate) fn date_style(&self) -> DateStyle<'_> {
        DateStyle {
            datetime: &self.date_format,
            date_only: &self.date_only_format,
            timezone: self.timezone,
        }
    }
}

fn checked_pattern(pattern: &str) -> ResultEngine<String> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(EngineError::Config(format!("invalid date format {pattern:?}")));
    }
    Ok(pattern.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("XLSX".parse::<ExportFormat>(), Ok(ExportFormat::Xlsx));
        assert_eq!("csv".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::Xlsx.to_string(), "xlsx");
    }

    #[test]
    fn validates_settings() {
        let settings = ExportSettings::default()
            .with_timezone("Europe/Rome")
            .unwrap()
            .with_date_format("%Y-%m-%d")
            .unwrap()
            .with_date_only_format("%d.%m.%Y")
            .unwrap();
        assert_eq!(settings.timezone, chrono_tz::Europe::Rome);
        assert_eq!(settings.date_format, "%Y-%m-%d");
        assert_eq!(settings.date_only_format, "%d.%m.%Y");

        assert!(matches!(
            ExportSettings::default().with_timezone("Mars/Olympus"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            ExportSettings::default().with_date_format("%Q"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            ExportSettings::default().with_date_only_format("%d %Q"),
            Err(EngineError::Config(_))
        ));
    }
}
