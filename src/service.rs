use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use crate::coerce::Coercer;
use crate::compose::{Composer, Composition};
use crate::datatype::Datum;
use crate::error::Result;
use crate::execute::{FromRow, QueryExecutor, Row};
use crate::fragment::{AvailableFragments, FragmentKind, FragmentStore, FragmentSummary};

/// Everything one dynamic query request carries.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicQueryRequest {
    pub base_query_name: String,
    /// When set, only fragments of this context resolve.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl DynamicQueryRequest {
    pub fn new(base_query_name: &str) -> Self {
        Self {
            base_query_name: base_query_name.to_owned(),
            ..Self::default()
        }
    }
    pub fn in_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_owned());
        self
    }
    pub fn filter(mut self, name: &str) -> Self {
        self.filters.push(name.to_owned());
        self
    }
    pub fn order_by(mut self, name: &str) -> Self {
        self.order = Some(name.to_owned());
        self
    }
    pub fn param(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.parameters.insert(name.to_owned(), value.into());
        self
    }
    pub fn paged(mut self, page: u64, size: u64) -> Self {
        self.page = Some(page);
        self.size = Some(size);
        self
    }
    /// `(limit, offset)` when both page and size were given, capped to what SQLite accepts.
    pub fn bounds(&self) -> Option<(u64, u64)> {
        const MAX: u64 = i64::MAX as u64;
        match (self.page, self.size) {
            (Some(page), Some(size)) => Some((size.min(MAX), page.saturating_mul(size).min(MAX))),
            _ => None,
        }
    }
}

/// Resolves, composes, binds and runs dynamic queries.
///
/// Holds only shared read handles; every call works on its own request data, so
/// one service can serve any number of concurrent callers.
pub struct DynamicQueryService {
    fragments: Arc<dyn FragmentStore>,
    executor: Arc<dyn QueryExecutor>,
    coercer: Coercer,
}

impl DynamicQueryService {
    pub fn new(fragments: Arc<dyn FragmentStore>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            fragments,
            executor,
            coercer: Coercer::default(),
        }
    }

    pub fn with_coercer(mut self, coercer: Coercer) -> Self {
        self.coercer = coercer;
        self
    }

    /// Names and descriptions of the active filters and orders of a context. Fragment text is never exposed here.
    pub fn available_fragments(&self, context: &str) -> Result<AvailableFragments> {
        let summaries = |kind: FragmentKind| -> Result<Vec<FragmentSummary>> {
            Ok(self
                .fragments
                .find_active_by_context(kind, context)?
                .iter()
                .map(FragmentSummary::from)
                .collect())
        };
        Ok(AvailableFragments {
            context: context.to_owned(),
            filters: summaries(FragmentKind::Filter)?,
            orders: summaries(FragmentKind::Order)?,
        })
    }

    fn resolve(&self, request: &DynamicQueryRequest) -> Result<Composition> {
        let composer = match request.context.as_deref() {
            Some(context) => Composer::scoped(self.fragments.as_ref(), context),
            None => Composer::new(self.fragments.as_ref()),
        };
        composer.resolve(&request.base_query_name, &request.filters, request.order.as_deref())
    }

    fn bind(&self, request: &DynamicQueryRequest) -> Result<Vec<(String, Datum)>> {
        let params = self.coercer.coerce_all(&request.parameters)?;
        for (name, value) in &params {
            info!(parameter = %name, value = %value, kind = value.type_name(), "setting parameter");
        }
        Ok(params)
    }

    pub fn execute(&self, request: &DynamicQueryRequest) -> Result<Vec<Row>> {
        let text = self.resolve(request)?.text();
        let params = self.bind(request)?;
        info!(query = %text, "executing dynamic query");
        let (limit, offset) = match request.bounds() {
            Some((limit, offset)) => (Some(limit), Some(offset)),
            None => (None, None),
        };
        self.executor.run(&text, &params, limit, offset)
    }

    /// Like [`execute`](Self::execute), decoding every row into `T`.
    pub fn execute_as<T: FromRow>(&self, request: &DynamicQueryRequest) -> Result<Vec<T>> {
        self.execute(request)?.iter().map(T::from_row).collect()
    }

    /// Total number of rows the request matches, ignoring its order and paging.
    pub fn count(&self, request: &DynamicQueryRequest) -> Result<i64> {
        let text = self.resolve(request)?.count_text();
        let params = self.bind(request)?;
        info!(query = %text, "executing count query");
        self.executor.run_count(&text, &params)
    }

    pub fn compose_and_execute(
        &self,
        base_name: &str,
        filter_names: &[String],
        order_name: Option<&str>,
        params: &Map<String, JsonValue>,
        page: Option<u64>,
        size: Option<u64>,
    ) -> Result<Vec<Row>> {
        self.execute(&DynamicQueryRequest {
            base_query_name: base_name.to_owned(),
            context: None,
            filters: filter_names.to_vec(),
            order: order_name.map(str::to_owned),
            parameters: params.clone(),
            page,
            size,
        })
    }

    pub fn compose_and_count(
        &self,
        base_name: &str,
        filter_names: &[String],
        params: &Map<String, JsonValue>,
    ) -> Result<i64> {
        self.count(&DynamicQueryRequest {
            base_query_name: base_name.to_owned(),
            filters: filter_names.to_vec(),
            parameters: params.clone(),
            ..DynamicQueryRequest::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DynaqueryError;
    use crate::execute::SqliteExecutor;
    use crate::fragment::FragmentDraft;
    use crate::persist::{PersistenceMode, Persistor};
    use serde_json::json;

    fn service() -> DynamicQueryService {
        let store = Persistor::new(PersistenceMode::InMemory).unwrap();
        store
            .connection()
            .lock()
            .unwrap()
            .execute_batch(
                "
                create table pet (id text primary key, name text, age integer);
                insert into pet values
                    ('00000000-0000-4000-8000-000000000001', 'Rex', 3),
                    ('00000000-0000-4000-8000-000000000002', 'Tom', 7),
                    ('00000000-0000-4000-8000-000000000003', 'Kit', 1);
                ",
            )
            .unwrap();
        let drafts = [
            (FragmentKind::Base, FragmentDraft::new("pets", "PET", "SELECT p.* FROM pet p WHERE 1 = 1")),
            (FragmentKind::Filter, FragmentDraft::new("older_than", "PET", "AND p.age > :age")),
            (FragmentKind::Filter, FragmentDraft::new("pet_by_id", "PET", "AND p.id = :id")),
            (FragmentKind::Filter, FragmentDraft::new("expired", "PET", "AND 0 = 1").inactive()),
            (FragmentKind::Order, FragmentDraft::new("by_age", "PET", "ORDER BY p.age").described("Youngest first")),
        ];
        for (kind, draft) in drafts {
            store.save(kind, None, &draft).unwrap();
        }
        let executor = SqliteExecutor::new(store.connection());
        let store: Arc<dyn FragmentStore> = Arc::new(store);
        DynamicQueryService::new(store, Arc::new(executor))
    }

    fn names(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r.get("name").unwrap().to_string()).collect()
    }

    #[test]
    fn executes_with_order_and_paging() {
        let service = service();
        let request = DynamicQueryRequest::new("pets").order_by("by_age");
        assert_eq!(names(&service.execute(&request).unwrap()), vec!["Kit", "Rex", "Tom"]);
        let page = service.execute(&request.clone().paged(1, 2)).unwrap();
        assert_eq!(names(&page), vec!["Tom"]);
        // paging is only applied when both page and size are present
        let mut half = request.clone();
        half.size = Some(1);
        assert_eq!(service.execute(&half).unwrap().len(), 3);
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let service = service();
        let request = DynamicQueryRequest::new("pets").paged(u64::MAX, 20);
        assert_eq!(request.bounds(), Some((20, i64::MAX as u64)));
        assert!(service.execute(&request).unwrap().is_empty());
        assert!(service.execute(&DynamicQueryRequest::new("pets").paged(1, u64::MAX)).unwrap().is_empty());
    }

    #[test]
    fn count_ignores_order_and_paging() {
        let service = service();
        let request = DynamicQueryRequest::new("pets")
            .filter("older_than")
            .param("age", 2)
            .order_by("by_age")
            .paged(0, 1);
        assert_eq!(service.execute(&request).unwrap().len(), 1);
        assert_eq!(service.count(&request).unwrap(), 2);
    }

    #[test]
    fn id_parameter_is_bound_as_uuid() {
        let service = service();
        let request = DynamicQueryRequest::new("pets")
            .filter("pet_by_id")
            .param("id", "00000000-0000-4000-8000-000000000002");
        assert_eq!(names(&service.execute(&request).unwrap()), vec!["Tom"]);
        let bad = DynamicQueryRequest::new("pets").filter("pet_by_id").param("id", "not-a-uuid");
        assert!(matches!(
            service.execute(&bad).unwrap_err(),
            DynaqueryError::InvalidParameterFormat { .. }
        ));
    }

    #[test]
    fn extra_coercion_rules_apply_by_name() {
        let mut coercer = Coercer::default();
        coercer.register("age", |name, value| match value {
            Datum::Text(text) => text.trim().parse::<i64>().map(Datum::Integer).map_err(|_| {
                DynaqueryError::InvalidParameterFormat {
                    name: name.to_owned(),
                    value: text,
                }
            }),
            other => Ok(other),
        });
        let service = service().with_coercer(coercer);
        let request = DynamicQueryRequest::new("pets")
            .filter("older_than")
            .param("age", " 2 ")
            .order_by("by_age");
        assert_eq!(names(&service.execute(&request).unwrap()), vec!["Rex", "Tom"]);
        let bad = DynamicQueryRequest::new("pets").filter("older_than").param("age", "two");
        match service.execute(&bad).unwrap_err() {
            DynaqueryError::InvalidParameterFormat { name, value } => {
                assert_eq!(name, "age");
                assert_eq!(value, "two");
            }
            other => panic!("unexpected error {other}"),
        }
        // the default id rule is still registered
        let bad = DynamicQueryRequest::new("pets").filter("pet_by_id").param("id", "not-a-uuid");
        assert!(matches!(
            service.execute(&bad).unwrap_err(),
            DynaqueryError::InvalidParameterFormat { .. }
        ));
    }

    #[test]
    fn unknown_fragment_and_engine_failures_are_distinguished() {
        let service = service();
        let err = service
            .execute(&DynamicQueryRequest::new("pets").filter("expired"))
            .unwrap_err();
        assert!(matches!(err, DynaqueryError::FragmentNotFound { kind: FragmentKind::Filter, .. }));
        // a filter whose parameter was never supplied fails inside the engine
        let err = service
            .execute(&DynamicQueryRequest::new("pets").filter("older_than"))
            .unwrap_err();
        assert!(matches!(err, DynaqueryError::QueryExecutionFailed(_)));
    }

    #[test]
    fn positional_entry_points_match_requests() {
        let service = service();
        let params: Map<String, JsonValue> = serde_json::from_value(json!({"age": 2})).unwrap();
        let filters = vec!["older_than".to_string()];
        let rows = service
            .compose_and_execute("pets", &filters, Some("by_age"), &params, Some(0), Some(10))
            .unwrap();
        assert_eq!(names(&rows), vec!["Rex", "Tom"]);
        assert_eq!(service.compose_and_count("pets", &filters, &params).unwrap(), 2);
    }

    #[test]
    fn available_fragments_expose_names_only() {
        let service = service();
        let available = service.available_fragments("PET").unwrap();
        let filters: Vec<&str> = available.filters.iter().map(|f| f.name_unique.as_str()).collect();
        assert_eq!(filters, vec!["older_than", "pet_by_id"]);
        assert_eq!(available.orders.len(), 1);
        assert_eq!(available.orders[0].description.as_deref(), Some("Youngest first"));
        let json = serde_json::to_string(&available).unwrap();
        assert!(!json.contains("ORDER BY"));
        assert!(service.available_fragments("NOTHING").unwrap().filters.is_empty());
    }

    #[test]
    fn scoped_requests_only_see_their_context() {
        let service = service();
        let request = DynamicQueryRequest::new("pets").in_context("CUSTOMER");
        assert!(matches!(
            service.execute(&request).unwrap_err(),
            DynaqueryError::FragmentNotFound { kind: FragmentKind::Base, .. }
        ));
        assert_eq!(service.execute(&DynamicQueryRequest::new("pets").in_context("PET")).unwrap().len(), 3);
    }
}
