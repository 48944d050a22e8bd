//! Customer search: the dynamic query engine and the indicator engine put to work
//! for one entity type.

use std::sync::Arc;

use chrono::NaiveDateTime;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::datatype::{Datum, TIMESTAMP_STORAGE};
use crate::error::{DynaqueryError, Result};
use crate::execute::{FromRow, Row};
use crate::fragment::AvailableFragments;
use crate::indicator::{Attributes, IndicatorEngine};
use crate::persist::Persistor;
use crate::rule::Indicator;
use crate::service::{DynamicQueryRequest, DynamicQueryService};

pub const CUSTOMER_CONTEXT: &str = "CUSTOMER";
pub const CUSTOMER_BASE_QUERY: &str = "customer_base_query";
pub const DEFAULT_PAGE_SIZE: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub trade_name: Option<String>,
    pub cnpj: String,
    pub active: bool,
    pub blocked: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
}

impl Customer {
    pub fn new(name: &str, cnpj: &str) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            trade_name: None,
            cnpj: cnpj.to_owned(),
            active: true,
            blocked: false,
            created_at: now,
            updated_at: Some(now),
            deleted_at: None,
        }
    }

    pub fn insert(&self, persistor: &Persistor) -> Result<()> {
        let db = persistor.connection();
        let db = db.lock()?;
        db.prepare_cached(
            "
            insert into customer (
                id, name, trade_name, cnpj, active, blocked, created_at, updated_at, deleted_at
            ) values (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )?
        .execute(params![
            self.id.to_string(),
            &self.name,
            &self.trade_name,
            &self.cnpj,
            self.active,
            self.blocked,
            self.created_at,
            self.updated_at,
            self.deleted_at
        ])?;
        Ok(())
    }
}

// Each attribute a rule may name is listed here.
impl Attributes for Customer {
    fn attribute(&self, name: &str) -> Option<Datum> {
        Some(match name {
            "id" => Datum::Uuid(self.id),
            "name" => Datum::from(self.name.as_str()),
            "tradeName" => Datum::from(self.trade_name.clone()),
            "cnpj" => Datum::from(self.cnpj.as_str()),
            "active" => Datum::Boolean(self.active),
            "blocked" => Datum::Boolean(self.blocked),
            "createdAt" => Datum::Timestamp(self.created_at),
            "updatedAt" => Datum::from(self.updated_at),
            "deletedAt" => Datum::from(self.deleted_at),
            _ => return None,
        })
    }
}

fn column<'r>(row: &'r Row, name: &str) -> Result<&'r Datum> {
    row.get(name).ok_or_else(|| {
        DynaqueryError::QueryExecutionFailed(format!("customer row has no column '{}'", name))
    })
}

fn mismatch(name: &str, value: &Datum) -> DynaqueryError {
    DynaqueryError::QueryExecutionFailed(format!(
        "customer column '{}' holds an unexpected {} value",
        name,
        value.type_name()
    ))
}

fn text(row: &Row, name: &str) -> Result<String> {
    match column(row, name)? {
        Datum::Text(s) => Ok(s.clone()),
        other => Err(mismatch(name, other)),
    }
}

fn optional_text(row: &Row, name: &str) -> Result<Option<String>> {
    match column(row, name)? {
        Datum::Null => Ok(None),
        Datum::Text(s) => Ok(Some(s.clone())),
        other => Err(mismatch(name, other)),
    }
}

fn flag(row: &Row, name: &str) -> Result<bool> {
    match column(row, name)? {
        Datum::Integer(i) => Ok(*i != 0),
        Datum::Boolean(b) => Ok(*b),
        other => Err(mismatch(name, other)),
    }
}

fn optional_timestamp(row: &Row, name: &str) -> Result<Option<NaiveDateTime>> {
    match column(row, name)? {
        Datum::Null => Ok(None),
        Datum::Timestamp(t) => Ok(Some(*t)),
        Datum::Text(s) => NaiveDateTime::parse_from_str(s, TIMESTAMP_STORAGE)
            .or_else(|_| NaiveDateTime::parse_from_str(s, crate::datatype::TIMESTAMP_DISPLAY))
            .map(Some)
            .map_err(|_| mismatch(name, &Datum::Text(s.clone()))),
        other => Err(mismatch(name, other)),
    }
}

impl FromRow for Customer {
    fn from_row(row: &Row) -> Result<Self> {
        let id = match column(row, "id")? {
            Datum::Uuid(id) => *id,
            Datum::Text(s) => Uuid::parse_str(s).map_err(|_| mismatch("id", &Datum::Text(s.clone())))?,
            other => return Err(mismatch("id", other)),
        };
        Ok(Self {
            id,
            name: text(row, "name")?,
            trade_name: optional_text(row, "trade_name")?,
            cnpj: text(row, "cnpj")?,
            active: flag(row, "active")?,
            blocked: flag(row, "blocked")?,
            created_at: optional_timestamp(row, "created_at")?
                .ok_or_else(|| mismatch("created_at", &Datum::Null))?,
            updated_at: optional_timestamp(row, "updated_at")?,
            deleted_at: optional_timestamp(row, "deleted_at")?,
        })
    }
}

/// A customer as returned by a search, with its evaluated indicators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerView {
    #[serde(flatten)]
    pub customer: Customer,
    pub indicators: Vec<Indicator>,
}

/// Filter and order names chosen by the client, plus the parameters they use.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFilter {
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub size: u64,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let total_pages = match request.size {
            0 => 0,
            size => total_elements.div_ceil(size),
        };
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSearchResponse {
    pub customers: Page<CustomerView>,
    pub available_queries: AvailableFragments,
}

pub struct SearchCustomers {
    queries: Arc<DynamicQueryService>,
    indicators: Arc<IndicatorEngine>,
}

impl SearchCustomers {
    pub fn new(queries: Arc<DynamicQueryService>, indicators: Arc<IndicatorEngine>) -> Self {
        Self { queries, indicators }
    }

    fn request(filter: &CustomerFilter, page: PageRequest) -> DynamicQueryRequest {
        DynamicQueryRequest {
            base_query_name: CUSTOMER_BASE_QUERY.to_owned(),
            context: Some(CUSTOMER_CONTEXT.to_owned()),
            filters: filter.filters.clone(),
            order: filter.order.clone().filter(|o| !o.trim().is_empty()),
            parameters: filter.parameters.clone(),
            page: Some(page.page),
            size: Some(page.size),
        }
    }

    pub fn execute(&self, filter: &CustomerFilter, page: PageRequest) -> Result<Page<CustomerView>> {
        let request = Self::request(filter, page);
        let customers = self
            .queries
            .execute_as::<Customer>(&request)?
            .into_iter()
            .map(|customer| {
                let indicators = self.indicators.evaluate(&customer, CUSTOMER_CONTEXT);
                CustomerView { customer, indicators }
            })
            .collect();
        let total = self.queries.count(&request)?;
        Ok(Page::new(customers, page, total.max(0) as u64))
    }

    /// The page of customers together with the filters and orders a client may pick from.
    pub fn execute_with_options(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<CustomerSearchResponse> {
        Ok(CustomerSearchResponse {
            customers: self.execute(filter, page)?,
            available_queries: self.queries.available_fragments(CUSTOMER_CONTEXT)?,
        })
    }
}
