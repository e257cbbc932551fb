//! Query executor.
//!
//! Runs a compiled query and returns the result as flat JSON rows. Failures
//! are fatal for the request: they usually mean a broken definition or an
//! outage, so nothing here retries.

use std::{future::Future, time::Duration};

use sea_orm::{ConnectionTrait, DbErr, FromQueryResult, JsonValue};
use tokio_util::sync::CancellationToken;

use crate::{EngineError, ResultEngine, filters::CompiledQuery};

/// One result row: field name to scalar value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Caller limits applied to every data-store call of a request.
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs `fut` under the configured timeout and cancellation token.
    pub(crate) async fn guard<F, T>(&self, fut: F) -> ResultEngine<T>
    where
        F: Future<Output = ResultEngine<T>>,
    {
        let timed = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::Timeout(limit)),
                },
                None => fut.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(EngineError::Cancelled),
                    result = timed => result,
                }
            }
            None => timed.await,
        }
    }
}

/// Executes `query` and collects every row.
pub async fn execute<C>(db: &C, query: &CompiledQuery, options: &RunOptions) -> ResultEngine<Vec<Row>>
where
    C: ConnectionTrait,
{
    let statement = query.to_statement(db.get_database_backend());
    let values = options
        .guard(async {
            JsonValue::find_by_statement(statement)
                .all(db)
                .await
                .map_err(EngineError::Query)
        })
        .await?;

    values.into_iter().map(into_row).collect()
}

fn into_row(value: JsonValue) -> ResultEngine<Row> {
    match value {
        JsonValue::Object(row) => Ok(row),
        other => Err(EngineError::Query(DbErr::Type(format!(
            "expected a row object, got {other}"
        )))),
    }
}
