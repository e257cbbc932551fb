use sea_orm::DatabaseConnection;

use crate::{ResultEngine, render::ExportSettings};

mod definitions;
mod options;
mod reports;

pub use options::FilterOptions;
pub use reports::{ExportDocument, ExportRequest, ReportRun};

use definitions::DefinitionCache;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// The report engine.
///
/// Every operation is read-only: definitions and report data are only ever
/// queried.
#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    settings: ExportSettings,
    cache: Option<DefinitionCache>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    settings: ExportSettings,
    cache_definitions: bool,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Branding and formatting of exported documents
    pub fn settings(mut self, settings: ExportSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    /// Keep loaded definitions in memory until invalidated
    pub fn cache_definitions(mut self, enabled: bool) -> EngineBuilder {
        self.cache_definitions = enabled;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            settings: self.settings,
            cache: self.cache_definitions.then(DefinitionCache::default),
        })
    }
}
