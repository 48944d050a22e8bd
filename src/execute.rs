//! The boundary where composed text meets the database.
//!
//! [`QueryExecutor`] is what the rest of the engine talks to; [`SqliteExecutor`]
//! is the implementation backed by the shared rusqlite connection. Parameters are
//! bound by name (`:name` in the text), offset and limit go on an outer select
//! wrapped around the text, and every failure raised while preparing, binding
//! or stepping a statement comes back as `QueryExecutionFailed` carrying SQLite's
//! own message.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Statement};
use serde_json::Value as JsonValue;

use crate::datatype::{Datum, Record};
use crate::error::{DynaqueryError, Result};
use crate::fragment::RawQueryText;

/// Parameters as bound to a statement: coerced values under their bare names.
pub type BoundParams = [(String, Datum)];

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Datum>,
}

/// How a row looks once its projection is taken into account.
#[derive(Debug, Clone, PartialEq)]
pub enum RowShape<'r> {
    /// Several columns.
    Tuple(&'r [Datum]),
    /// A single plain value.
    Scalar(&'r Datum),
    /// A single column holding a JSON object, e.g. from `json_object(...)`.
    Object(Record),
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Datum> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    pub fn shape(&self) -> RowShape<'_> {
        match self.values.as_slice() {
            [single] => match single {
                Datum::Text(text) if text.trim_start().starts_with('{') => {
                    match serde_json::from_str::<JsonValue>(text) {
                        Ok(JsonValue::Object(object)) => RowShape::Object(Record::from_json_object(&object)),
                        _ => RowShape::Scalar(single),
                    }
                }
                _ => RowShape::Scalar(single),
            },
            values => RowShape::Tuple(values),
        }
    }

    /// Column name to value, in projection order.
    pub fn to_record(&self) -> Record {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

/// Decoding of an executed row into a domain type.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

impl FromRow for Record {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.to_record())
    }
}

pub trait QueryExecutor: Send + Sync {
    /// Runs `text` and returns its rows, skipping `offset` rows and returning at most `limit`.
    fn run(
        &self,
        text: &RawQueryText,
        params: &BoundParams,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Row>>;

    /// Runs `text` and reads its single scalar result as a count.
    fn run_count(&self, text: &RawQueryText, params: &BoundParams) -> Result<i64>;
}

fn failed(e: rusqlite::Error) -> DynaqueryError {
    DynaqueryError::QueryExecutionFailed(e.to_string())
}

/// Wraps the text in an outer select carrying the paging clause.
///
/// The text is never edited, so a trailing comment or a `LIMIT` of its own
/// cannot swallow or clash with the bounds. `LIMIT -1` is SQLite for "no limit".
fn paged(text: &RawQueryText, limit: Option<u64>, offset: Option<u64>) -> String {
    let sql = text.as_str().trim_end().trim_end_matches(';');
    let offset = offset.unwrap_or(0);
    if limit.is_none() && offset == 0 {
        return sql.to_owned();
    }
    let limit = limit.map_or(-1, sqlite_bound);
    format!("SELECT * FROM (\n{}\n) LIMIT {} OFFSET {}", sql, limit, sqlite_bound(offset))
}

/// SQLite bounds are signed 64-bit.
fn sqlite_bound(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    db: Arc<Mutex<Connection>>,
}

impl SqliteExecutor {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn prepare<'c>(db: &'c Connection, sql: &str, params: &BoundParams) -> Result<Statement<'c>> {
        let mut statement = db.prepare(sql).map_err(failed)?;
        if !statement.readonly() {
            return Err(DynaqueryError::QueryExecutionFailed(
                "only read-only statements can be executed".into(),
            ));
        }
        for (name, value) in params {
            let placeholder = format!(":{}", name);
            match statement.parameter_index(&placeholder).map_err(failed)? {
                Some(index) => statement.raw_bind_parameter(index, value).map_err(failed)?,
                None => {
                    return Err(DynaqueryError::QueryExecutionFailed(format!(
                        "Could not locate named parameter [{}] in query",
                        name
                    )))
                }
            }
        }
        for index in 1..=statement.parameter_count() {
            let bound = statement
                .parameter_name(index)
                .and_then(|p| p.strip_prefix(':'))
                .is_some_and(|p| params.iter().any(|(name, _)| name == p));
            if !bound {
                return Err(DynaqueryError::QueryExecutionFailed(format!(
                    "No value bound for query parameter {}",
                    statement.parameter_name(index).unwrap_or("?")
                )));
            }
        }
        Ok(statement)
    }
}

impl QueryExecutor for SqliteExecutor {
    fn run(
        &self,
        text: &RawQueryText,
        params: &BoundParams,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Row>> {
        let sql = paged(text, limit, offset);
        let db = self.db.lock()?;
        let mut statement = Self::prepare(&db, &sql, params)?;
        let columns: Vec<String> = statement.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = statement.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(failed)? {
            let values = (0..width)
                .map(|i| row.get::<_, Datum>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(failed)?;
            result.push(Row {
                columns: columns.clone(),
                values,
            });
        }
        Ok(result)
    }

    fn run_count(&self, text: &RawQueryText, params: &BoundParams) -> Result<i64> {
        let db = self.db.lock()?;
        let mut statement = Self::prepare(&db, text.as_str().trim_end().trim_end_matches(';'), params)?;
        let mut rows = statement.raw_query();
        match rows.next().map_err(failed)? {
            Some(row) => match row.get::<_, Datum>(0).map_err(failed)? {
                Datum::Integer(count) => Ok(count),
                other => Err(DynaqueryError::QueryExecutionFailed(format!(
                    "Count query returned a non-integer result: {}",
                    other
                ))),
            },
            None => Err(DynaqueryError::QueryExecutionFailed(
                "Count query returned no result".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SqliteExecutor {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch(
                "
                create table item (id integer primary key, label text, price real);
                insert into item values (1, 'bolt', 0.5), (2, 'nut', 0.25), (3, 'gear', 12.0), (4, 'spring', 1.75);
                ",
            )
            .unwrap();
        SqliteExecutor::new(Arc::new(Mutex::new(connection)))
    }

    #[test]
    fn pages_with_limit_and_offset() {
        let ex = executor();
        let rows = ex
            .run(&"SELECT label FROM item ORDER BY id".into(), &[], Some(2), Some(2))
            .unwrap();
        let labels: Vec<String> = rows.iter().map(|r| r.values[0].to_string()).collect();
        assert_eq!(labels, vec!["gear", "spring"]);
        let rows = ex.run(&"SELECT label FROM item;".into(), &[], None, None).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn paging_survives_trailing_comments_and_own_limits() {
        let ex = executor();
        let rows = ex
            .run(&"SELECT label FROM item ORDER BY id -- oldest first".into(), &[], Some(2), None)
            .unwrap();
        let labels: Vec<String> = rows.iter().map(|r| r.values[0].to_string()).collect();
        assert_eq!(labels, vec!["bolt", "nut"]);
        let rows = ex
            .run(&"SELECT label FROM item ORDER BY id LIMIT 3".into(), &[], Some(2), Some(0))
            .unwrap();
        assert_eq!(rows.len(), 2);
        let rows = ex
            .run(&"SELECT label FROM item ORDER BY id LIMIT 3".into(), &[], None, Some(1))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns, vec!["label"]);
    }

    #[test]
    fn huge_offsets_return_nothing() {
        let ex = executor();
        let rows = ex
            .run(&"SELECT label FROM item".into(), &[], Some(u64::MAX), Some(u64::MAX))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn binds_named_parameters() {
        let ex = executor();
        let params = vec![("min".to_string(), Datum::Real(1.0))];
        let rows = ex
            .run(&"SELECT * FROM item WHERE price > :min ORDER BY id".into(), &params, None, None)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns, vec!["id", "label", "price"]);
        assert_eq!(rows[0].get("LABEL"), Some(&Datum::Text("gear".into())));
        let count = ex
            .run_count(&"SELECT COUNT(*) FROM item WHERE price > :min".into(), &params)
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn unknown_and_missing_parameters_fail() {
        let ex = executor();
        let params = vec![("max".to_string(), Datum::Integer(3))];
        let err = ex.run(&"SELECT * FROM item".into(), &params, None, None).unwrap_err();
        assert!(err.to_string().contains("max"));
        let err = ex
            .run(&"SELECT * FROM item WHERE id = :id".into(), &[], None, None)
            .unwrap_err();
        assert!(matches!(err, DynaqueryError::QueryExecutionFailed(_)));
    }

    #[test]
    fn engine_messages_pass_through() {
        let ex = executor();
        match ex.run(&"SELECT * FROM nowhere".into(), &[], None, None).unwrap_err() {
            DynaqueryError::QueryExecutionFailed(message) => assert!(message.contains("no such table")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn writes_are_refused() {
        let ex = executor();
        let err = ex
            .run(&"DELETE FROM item".into(), &[], None, None)
            .unwrap_err();
        assert!(matches!(err, DynaqueryError::QueryExecutionFailed(_)));
        assert_eq!(ex.run_count(&"SELECT COUNT(*) FROM item".into(), &[]).unwrap(), 4);
    }

    #[test]
    fn row_shapes() {
        let row = Row {
            columns: vec!["a".into(), "b".into()],
            values: vec![Datum::Integer(1), Datum::Text("x".into())],
        };
        assert!(matches!(row.shape(), RowShape::Tuple(values) if values.len() == 2));
        let row = Row {
            columns: vec!["n".into()],
            values: vec![Datum::Integer(5)],
        };
        assert_eq!(row.shape(), RowShape::Scalar(&Datum::Integer(5)));
        let row = Row {
            columns: vec!["obj".into()],
            values: vec![Datum::Text(r#"{"name":"Acme","active":true}"#.into())],
        };
        match row.shape() {
            RowShape::Object(record) => {
                assert_eq!(record.keys().collect::<Vec<_>>(), vec!["name", "active"]);
                assert_eq!(record.get("active"), Some(&Datum::Boolean(true)));
            }
            other => panic!("unexpected shape {other:?}"),
        }
        let row = Row {
            columns: vec!["t".into()],
            values: vec![Datum::Text("{not json".into())],
        };
        assert!(matches!(row.shape(), RowShape::Scalar(_)));
    }
}
