use std::collections::BTreeMap;

use futures::future::try_join_all;
use sea_orm::{ConnectionTrait, JsonValue};

use crate::{
    EngineError, ResultEngine,
    definitions::{OptionsSource, ReportDefinition, ReportFilter},
    executor::{RunOptions, execute},
    filters::CompiledQuery,
};

use super::Engine;

/// Selectable values of each filter that has an options source, keyed by
/// filter field name.
pub type FilterOptions = BTreeMap<String, Vec<JsonValue>>;

impl Engine {
    /// Resolves the selectable values of the filters of report `code`.
    ///
    /// Query sources run concurrently; filters without a source are omitted.
    pub async fn filter_options(
        &self,
        code: &str,
        options: &RunOptions,
    ) -> ResultEngine<FilterOptions> {
        let definition = self.get_definition(code).await?;
        resolve_options(&self.database, &definition, options).await
    }
}

pub(crate) async fn resolve_options<C>(
    db: &C,
    definition: &ReportDefinition,
    options: &RunOptions,
) -> ResultEngine<FilterOptions>
where
    C: ConnectionTrait,
{
    let mut resolved = FilterOptions::new();
    let mut queries = Vec::new();

    for filter in &definition.filters {
        match &filter.options {
            OptionsSource::None => {}
            OptionsSource::Static(literal) => {
                let values = parse_static(&definition.code, filter, literal)?;
                resolved.insert(filter.field_name.clone(), values);
            }
            OptionsSource::Query(sql) => queries.push(async move {
                let rows = execute(db, &CompiledQuery::unfiltered(sql), options).await?;
                let values = rows.into_iter().map(JsonValue::Object).collect::<Vec<_>>();
                Ok::<_, EngineError>((filter.field_name.clone(), values))
            }),
        }
    }

    resolved.extend(try_join_all(queries).await?);

    tracing::debug!(
        report = %definition.code,
        filters = resolved.len(),
        "filter options resolved"
    );
    Ok(resolved)
}

fn parse_static(code: &str, filter: &ReportFilter, literal: &str) -> ResultEngine<Vec<JsonValue>> {
    serde_json::from_str::<Vec<JsonValue>>(literal).map_err(|err| {
        EngineError::Config(format!(
            "report '{code}', filter '{}': static options are not a JSON array: {err}",
            filter.field_name
        ))
    })
}
