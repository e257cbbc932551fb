//! Dynamic report engine.
//!
//! Reports are stored as data: a base SQL query, its output columns, its
//! filters and an optional summary calculation. The [`Engine`] loads a
//! definition, compiles the caller's filter values into a parameterized
//! query, runs it, computes the totals and renders the rows into an export
//! document.

pub use definitions::{
    Alignment, DataType, FilterType, OptionsSource, ReportAccess, ReportColumn, ReportDefinition,
    ReportFilter, ReportSummary,
};
pub use error::EngineError;
pub use executor::{Row, RunOptions, execute};
pub use filters::{ALL_SENTINEL, CompiledQuery, FilterClause, FilterValues, compile};
pub use ops::{Engine, EngineBuilder, ExportDocument, ExportRequest, FilterOptions, ReportRun};
pub use render::{
    Amount, AmountDisplay, CellValue, CsvRenderer, ExportFormat, ExportSettings, LayoutColumn,
    Renderer, ReportLayout, XlsxRenderer,
};
pub use summary::{Summary, Totals, summarize};
pub use tokio_util::sync::CancellationToken;

mod definitions;
mod error;
mod executor;
mod filters;
mod ops;
mod render;
mod summary;

pub mod report_columns;
pub mod report_definitions;
pub mod report_filters;

pub type ResultEngine<T> = Result<T, EngineError>;
