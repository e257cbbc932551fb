//! Report definitions as the engine sees them.
//!
//! A [`ReportDefinition`] owns its active columns and filters, already sorted
//! by `sort_order`. Definitions are read-only: the engine loads them from the
//! metadata store and never writes them back.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::{
    EngineError, ResultEngine, filters::count_placeholders, report_columns, report_definitions,
    report_filters,
};

/// How the values of a column are formatted on export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Number,
    Currency,
    Date,
}

impl DataType {
    /// Parses a stored data type; unknown values degrade to `String`.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "number" => DataType::Number,
            "currency" => DataType::Currency,
            "date" | "datetime" => DataType::Date,
            _ => DataType::String,
        }
    }
}

/// Horizontal alignment of a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    /// Parses a stored alignment; unknown values degrade to `Left`.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" => Alignment::Center,
            "right" => Alignment::Right,
            _ => Alignment::Left,
        }
    }
}

/// Kind of filter, which fixes how many placeholders its condition holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Equals,
    Select,
    Text,
    Number,
    Date,
    DateRange,
}

impl FilterType {
    /// Number of `?` placeholders the filter condition must contain.
    #[must_use]
    pub const fn placeholders(self) -> usize {
        match self {
            FilterType::DateRange => 2,
            _ => 1,
        }
    }
}

impl TryFrom<&str> for FilterType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "equals" => Ok(FilterType::Equals),
            "select" => Ok(FilterType::Select),
            "text" => Ok(FilterType::Text),
            "number" => Ok(FilterType::Number),
            "date" => Ok(FilterType::Date),
            "daterange" | "date_range" => Ok(FilterType::DateRange),
            other => Err(EngineError::Config(format!(
                "unsupported filter type: {other}"
            ))),
        }
    }
}

/// Where the selectable values of a filter come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionsSource {
    /// Free input, no candidate values.
    None,
    /// A literal JSON array stored with the filter.
    Static(String),
    /// A SELECT statement returning one row per option.
    Query(String),
}

/// One output column of a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportColumn {
    pub field_name: String,
    pub display_name: String,
    pub data_type: DataType,
    pub alignment: Alignment,
    /// Width hint in pixels.
    pub width: u32,
    pub sort_order: i32,
}

impl From<&report_columns::Model> for ReportColumn {
    fn from(model: &report_columns::Model) -> Self {
        Self {
            field_name: model.field_name.clone(),
            display_name: model.display_name.clone(),
            data_type: DataType::from_stored(&model.data_type),
            alignment: Alignment::from_stored(&model.alignment),
            width: u32::try_from(model.width).unwrap_or(0),
            sort_order: model.sort_order,
        }
    }
}

/// One filter of a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportFilter {
    /// Logical key used to look up the caller-supplied value.
    pub field_name: String,
    pub label: String,
    pub filter_type: FilterType,
    /// SQL condition with `?` placeholders, appended with `AND`.
    pub condition: String,
    pub options: OptionsSource,
    pub sort_order: i32,
}

impl ReportFilter {
    fn from_model(report_code: &str, model: &report_filters::Model) -> ResultEngine<Self> {
        let filter_type = FilterType::try_from(model.filter_type.as_str()).map_err(|err| {
            EngineError::Config(format!(
                "report '{report_code}', filter '{}': {err}",
                model.field_name
            ))
        })?;

        let found = count_placeholders(&model.condition);
        if found != filter_type.placeholders() {
            return Err(EngineError::Config(format!(
                "report '{report_code}', filter '{}': condition has {found} placeholders, expected {}",
                model.field_name,
                filter_type.placeholders()
            )));
        }

        let stored = model
            .options
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);
        let options = match (model.options_source.trim().to_ascii_lowercase().as_str(), stored) {
            ("" | "none", _) => OptionsSource::None,
            ("static", Some(literal)) => OptionsSource::Static(literal),
            ("query", Some(sql)) => OptionsSource::Query(sql),
            (source @ ("static" | "query"), None) => {
                return Err(EngineError::Config(format!(
                    "report '{report_code}', filter '{}': {source} options source without options",
                    model.field_name
                )));
            }
            (other, _) => {
                return Err(EngineError::Config(format!(
                    "report '{report_code}', filter '{}': unsupported options source: {other}",
                    model.field_name
                )));
            }
        };

        Ok(Self {
            field_name: model.field_name.clone(),
            label: model.label.clone(),
            filter_type,
            condition: model.condition.clone(),
            options,
            sort_order: model.sort_order,
        })
    }
}

/// A complete report definition with its active columns and filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportDefinition {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// SELECT statement the filters are appended to.
    pub base_query: String,
    /// Summary calculation script (JSON aggregation DSL).
    pub calculation: Option<String>,
    pub sheet_name: Option<String>,
    pub category: Option<String>,
    pub sort_order: i32,
    pub is_public: bool,
    pub required_permission: Option<String>,
    /// Active columns, left to right.
    pub columns: Vec<ReportColumn>,
    /// Active filters, in compilation order.
    pub filters: Vec<ReportFilter>,
}

impl ReportDefinition {
    /// Assemble a definition from its stored rows.
    ///
    /// `columns` and `filters` must already be the active rows ordered by
    /// `sort_order`.
    pub(crate) fn from_models(
        model: report_definitions::Model,
        columns: &[report_columns::Model],
        filters: &[report_filters::Model],
    ) -> ResultEngine<Self> {
        let filters = filters
            .iter()
            .map(|filter| ReportFilter::from_model(&model.code, filter))
            .collect::<ResultEngine<Vec<_>>>()?;

        Ok(Self {
            columns: columns.iter().map(ReportColumn::from).collect(),
            filters,
            code: model.code,
            name: model.name,
            description: model.description,
            base_query: model.base_query,
            calculation: model.calculation,
            sheet_name: model.sheet_name,
            category: model.category,
            sort_order: model.sort_order,
            is_public: model.is_public,
            required_permission: model.required_permission,
        })
    }

    /// Look up an active filter by field name.
    #[cfg(test)]
    pub(crate) fn filter(&self, field_name: &str) -> Option<&ReportFilter> {
        self.filters.iter().find(|f| f.field_name == field_name)
    }
}

/// Listing entry for a report, as shown in navigation menus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sort_order: i32,
}

impl From<report_definitions::Model> for ReportSummary {
    fn from(model: report_definitions::Model) -> Self {
        Self {
            code: model.code,
            name: model.name,
            description: model.description,
            category: model.category,
            sort_order: model.sort_order,
        }
    }
}

/// Which reports a caller may see in listings.
///
/// The caller has already authenticated and resolved the user's permission
/// codes; this only narrows the listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportAccess {
    /// `None` lists every active report, public or not.
    permissions: Option<BTreeSet<String>>,
}

impl ReportAccess {
    /// Every active report.
    #[must_use]
    pub fn all() -> Self {
        Self { permissions: None }
    }

    /// Public reports whose required permission (if any) is granted.
    pub fn with_permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permissions: Some(permissions.into_iter().map(Into::into).collect()),
        }
    }

    pub(crate) fn allows(&self, model: &report_definitions::Model) -> bool {
        let Some(granted) = &self.permissions else {
            return true;
        };
        if !model.is_public {
            return false;
        }
        match model.required_permission.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(permission) => granted.contains(permission),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_model(filter_type: &str, condition: &str) -> report_filters::Model {
        report_filters::Model {
            id: 1,
            report_id: 1,
            field_name: "status".to_string(),
            label: "Status".to_string(),
            filter_type: filter_type.to_string(),
            condition: condition.to_string(),
            options_source: "static".to_string(),
            options: Some(r#"["paid","open"]"#.to_string()),
            sort_order: 1,
            is_active: true,
        }
    }

    fn definition_model(is_public: bool, permission: Option<&str>) -> report_definitions::Model {
        report_definitions::Model {
            id: 1,
            code: "sales".to_string(),
            name: "Sales".to_string(),
            description: None,
            base_query: "SELECT * FROM sales".to_string(),
            calculation: None,
            sheet_name: None,
            category: None,
            sort_order: 0,
            is_active: true,
            is_public,
            required_permission: permission.map(ToString::to_string),
        }
    }

    #[test]
    fn unknown_data_type_degrades_to_string() {
        assert_eq!(DataType::from_stored("currency"), DataType::Currency);
        assert_eq!(DataType::from_stored(" Number "), DataType::Number);
        assert_eq!(DataType::from_stored("percentage"), DataType::String);
        assert_eq!(Alignment::from_stored("RIGHT"), Alignment::Right);
        assert_eq!(Alignment::from_stored("justify"), Alignment::Left);
    }

    #[test]
    fn filter_placeholders_must_match_type() {
        let ok = ReportFilter::from_model("sales", &filter_model("select", "status = ?"));
        assert!(ok.is_ok());

        let range = ReportFilter::from_model(
            "sales",
            &filter_model("daterange", "sold_at BETWEEN ? AND ?"),
        );
        assert_eq!(range.unwrap().filter_type, FilterType::DateRange);

        let err = ReportFilter::from_model("sales", &filter_model("daterange", "sold_at >= ?"));
        assert!(matches!(err, Err(EngineError::Config(_))));
    }

    #[test]
    fn quoted_question_marks_are_not_placeholders() {
        let filter =
            ReportFilter::from_model("sales", &filter_model("text", "note <> '?' AND status = ?"));
        assert!(filter.is_ok());
    }

    #[test]
    fn unknown_filter_type_is_config_error() {
        let err = ReportFilter::from_model("sales", &filter_model("between", "x = ?"));
        assert!(matches!(err, Err(EngineError::Config(_))));
    }

    #[test]
    fn options_source_requires_options() {
        let mut model = filter_model("select", "status = ?");
        model.options = None;
        let err = ReportFilter::from_model("sales", &model);
        assert!(matches!(err, Err(EngineError::Config(_))));

        model.options_source = "none".to_string();
        let filter = ReportFilter::from_model("sales", &model).unwrap();
        assert_eq!(filter.options, OptionsSource::None);
    }

    #[test]
    fn access_filters_private_and_permissioned_reports() {
        let everything = ReportAccess::all();
        assert!(everything.allows(&definition_model(false, Some("admin"))));

        let seller = ReportAccess::with_permissions(["sales.read"]);
        assert!(seller.allows(&definition_model(true, None)));
        assert!(seller.allows(&definition_model(true, Some("sales.read"))));
        assert!(!seller.allows(&definition_model(true, Some("admin"))));
        assert!(!seller.allows(&definition_model(false, None)));
    }
}
