use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    ReportDefinition, ResultEngine,
    executor::{Row, RunOptions, execute},
    filters::{CompiledQuery, FilterValues, compile},
    render::{ExportFormat, ReportLayout},
    summary::{Totals, summarize},
};

use super::Engine;

/// Result of running a report: the rows and the totals computed on them.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportRun {
    pub definition: Arc<ReportDefinition>,
    pub query: CompiledQuery,
    pub rows: Vec<Row>,
    pub totals: Totals,
}

/// What to export and under which limits.
#[derive(Clone, Debug, Default)]
pub struct ExportRequest {
    pub format: ExportFormat,
    /// Written under the title lines when set.
    pub generated_at: Option<DateTime<Utc>>,
    pub run: RunOptions,
}

impl ExportRequest {
    #[must_use]
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_run_options(mut self, run: RunOptions) -> Self {
        self.run = run;
        self
    }
}

/// A rendered export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportDocument {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub row_count: usize,
}

impl Engine {
    /// Loads report `code`, applies `values` and runs it.
    ///
    /// Nothing is queried when the report does not exist. Totals are
    /// computed fail-soft and are empty when the calculation breaks.
    pub async fn run_report(
        &self,
        code: &str,
        values: &FilterValues,
        options: &RunOptions,
    ) -> ResultEngine<ReportRun> {
        let definition = self.get_definition(code).await?;
        let query = compile(&definition, values);
        tracing::debug!(
            report = %definition.code,
            sql = %query.sql(),
            filters = ?query.applied(),
            params = query.params().len(),
            "report query compiled"
        );

        let rows = execute(&self.database, &query, options).await?;
        let totals = summarize(&definition, &rows);
        tracing::info!(
            report = %definition.code,
            rows = rows.len(),
            totals = totals.len(),
            "report executed"
        );

        Ok(ReportRun {
            definition,
            query,
            rows,
            totals,
        })
    }

    /// Runs report `code` and renders it in the requested format.
    pub async fn export_report(
        &self,
        code: &str,
        values: &FilterValues,
        request: &ExportRequest,
    ) -> ResultEngine<ExportDocument> {
        let run = self.run_report(code, values, &request.run).await?;
        self.render_report(&run, request)
    }

    /// Renders an already executed run without querying again.
    pub fn render_report(
        &self,
        run: &ReportRun,
        request: &ExportRequest,
    ) -> ResultEngine<ExportDocument> {
        let layout = ReportLayout::build(
            &run.definition,
            &run.rows,
            &run.totals,
            &self.settings,
            request.generated_at,
        );
        let bytes = request.format.render(&layout)?;
        tracing::info!(
            report = %run.definition.code,
            format = %request.format,
            bytes = bytes.len(),
            "report exported"
        );

        Ok(ExportDocument {
            format: request.format,
            bytes,
            row_count: run.rows.len(),
        })
    }
}
