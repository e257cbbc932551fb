use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};

use crate::{
    EngineError, ResultEngine, ReportAccess, ReportDefinition, ReportSummary, report_columns,
    report_definitions, report_filters,
};

use super::{Engine, with_tx};

/// Loaded definitions by code.
///
/// Entries are replaced whole, never mutated, so readers holding an `Arc`
/// keep a consistent definition. Every invalidation bumps `generation`; a
/// load started before an invalidation is not cached.
#[derive(Debug, Default)]
pub(crate) struct DefinitionCache {
    entries: DashMap<String, Arc<ReportDefinition>>,
    generation: AtomicU64,
}

impl DefinitionCache {
    fn get(&self, code: &str) -> Option<Arc<ReportDefinition>> {
        self.entries.get(code).map(|entry| Arc::clone(entry.value()))
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Caches `definition` unless an invalidation happened after `seen`.
    fn insert_if_current(&self, definition: Arc<ReportDefinition>, seen: u64) -> bool {
        // The shard lock is held across the check, so a concurrent `remove`
        // either runs after this insert or is observed by it.
        let entry = self.entries.entry(definition.code.clone());
        if self.generation() != seen {
            return false;
        }
        entry.insert(definition);
        true
    }

    fn remove(&self, code: &str) -> bool {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.remove(code).is_some()
    }

    fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }
}

impl Engine {
    /// Returns the active definition `code` with its active columns and
    /// filters.
    pub async fn get_definition(&self, code: &str) -> ResultEngine<Arc<ReportDefinition>> {
        if let Some(definition) = self.cache.as_ref().and_then(|cache| cache.get(code)) {
            return Ok(definition);
        }

        let seen = self.cache.as_ref().map(DefinitionCache::generation);
        let definition = Arc::new(self.load_definition(code).await?);
        if let (Some(cache), Some(seen)) = (&self.cache, seen)
            && !cache.insert_if_current(Arc::clone(&definition), seen)
        {
            tracing::debug!(report = %code, "definition invalidated while loading, not cached");
        }
        Ok(definition)
    }

    /// Drops `code` from the definition cache. Returns whether it was cached.
    ///
    /// A load of `code` still in flight is returned to its caller but not
    /// cached.
    pub fn invalidate_definition(&self, code: &str) -> bool {
        self.cache.as_ref().is_some_and(|cache| cache.remove(code))
    }

    /// Drops every cached definition.
    pub fn clear_definition_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Lists the active reports visible with `access`, ordered by category,
    /// sort order and code.
    pub async fn list_reports(&self, access: &ReportAccess) -> ResultEngine<Vec<ReportSummary>> {
        let models = report_definitions::Entity::find()
            .filter(report_definitions::Column::IsActive.eq(true))
            .order_by_asc(report_definitions::Column::Category)
            .order_by_asc(report_definitions::Column::SortOrder)
            .order_by_asc(report_definitions::Column::Code)
            .all(&self.database)
            .await?;

        Ok(models
            .into_iter()
            .filter(|model| access.allows(model))
            .map(ReportSummary::from)
            .collect())
    }

    async fn load_definition(&self, code: &str) -> ResultEngine<ReportDefinition> {
        let definition = with_tx!(self, |db_tx| {
            let model = report_definitions::Entity::find()
                .filter(report_definitions::Column::Code.eq(code))
                .filter(report_definitions::Column::IsActive.eq(true))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound(code.to_string()))?;

            let columns = report_columns::Entity::find()
                .filter(report_columns::Column::ReportId.eq(model.id))
                .filter(report_columns::Column::IsActive.eq(true))
                .order_by_asc(report_columns::Column::SortOrder)
                .order_by_asc(report_columns::Column::Id)
                .all(&db_tx)
                .await?;

            let filters = report_filters::Entity::find()
                .filter(report_filters::Column::ReportId.eq(model.id))
                .filter(report_filters::Column::IsActive.eq(true))
                .order_by_asc(report_filters::Column::SortOrder)
                .order_by_asc(report_filters::Column::Id)
                .all(&db_tx)
                .await?;

            ReportDefinition::from_models(model, &columns, &filters)
        })?;

        tracing::debug!(
            report = %definition.code,
            columns = definition.columns.len(),
            filters = definition.filters.len(),
            "report definition loaded"
        );
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(code: &str) -> Arc<ReportDefinition> {
        Arc::new(ReportDefinition {
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            base_query: "SELECT 1".to_string(),
            calculation: None,
            sheet_name: None,
            category: None,
            sort_order: 0,
            is_public: true,
            required_permission: None,
            columns: Vec::new(),
            filters: Vec::new(),
        })
    }

    #[test]
    fn caches_until_removed() {
        let cache = DefinitionCache::default();
        assert!(cache.insert_if_current(definition("sales"), cache.generation()));
        assert_eq!(cache.get("sales").map(|d| d.code.clone()).as_deref(), Some("sales"));

        assert!(cache.remove("sales"));
        assert!(!cache.remove("sales"));
        assert!(cache.get("sales").is_none());
    }

    #[test]
    fn load_started_before_invalidation_is_not_cached() {
        let cache = DefinitionCache::default();
        let seen = cache.generation();
        cache.remove("sales");
        assert!(!cache.insert_if_current(definition("sales"), seen));
        assert!(cache.get("sales").is_none());

        let seen = cache.generation();
        cache.clear();
        assert!(!cache.insert_if_current(definition("sales"), seen));
        assert!(cache.get("sales").is_none());

        assert!(cache.insert_if_current(definition("sales"), cache.generation()));
        assert!(cache.get("sales").is_some());
    }
}
