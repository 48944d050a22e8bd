//! Ad-hoc execution of unregistered query text, for trying fragments out before
//! they are stored. A preview never fails outward: whatever goes wrong is folded
//! into an invalid [`PreviewResult`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{error, info};

use crate::compose::join;
use crate::datatype::{Datum, Record};
use crate::error::Result;
use crate::execute::{QueryExecutor, Row, RowShape};
use crate::fragment::RawQueryText;

/// Rows returned by a preview, however many the query matches.
pub const PREVIEW_LIMIT: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub base_query: RawQueryText,
    #[serde(default)]
    pub filters: Vec<RawQueryText>,
    #[serde(default)]
    pub orders: Vec<RawQueryText>,
    #[serde(default)]
    pub parameters: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub final_query: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub preview_results: Vec<Record>,
    pub total_results: u64,
}

/// Turns a row into a flat record: `column_1..n` for several columns, `value` for
/// a single plain value, and one entry per attribute for a single JSON object.
pub fn shape_row(row: &Row) -> Record {
    match row.shape() {
        RowShape::Tuple(values) => values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("column_{}", i + 1), v.clone()))
            .collect(),
        RowShape::Scalar(value) => {
            let mut record = Record::new();
            record.insert("value", value.clone());
            record
        }
        RowShape::Object(record) => record,
    }
}

pub struct Previewer {
    executor: Arc<dyn QueryExecutor>,
    limit: u64,
}

impl Previewer {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            limit: PREVIEW_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn preview(&self, request: &PreviewRequest) -> PreviewResult {
        let text = join(&request.base_query, &request.filters, &request.orders);
        info!(query = %text, "preview query");
        match self.run(&text, &request.parameters) {
            Ok((rows, total)) => PreviewResult {
                final_query: text.into_string(),
                valid: true,
                error_message: None,
                preview_results: rows,
                total_results: total,
            },
            Err(e) => {
                error!(query = %text, error = %e, "error previewing query");
                let message = e.to_string();
                PreviewResult {
                    final_query: text.into_string(),
                    valid: false,
                    error_message: Some(if message.is_empty() {
                        "unknown error".to_owned()
                    } else {
                        message
                    }),
                    preview_results: Vec::new(),
                    total_results: 0,
                }
            }
        }
    }

    fn run(&self, text: &RawQueryText, parameters: &Map<String, JsonValue>) -> Result<(Vec<Record>, u64)> {
        // bound as given, without the coercions dynamic queries get
        let params: Vec<(String, Datum)> = parameters
            .iter()
            .map(|(name, raw)| (name.clone(), Datum::from_json(raw)))
            .collect();
        let rows = self.executor.run(text, &params, Some(self.limit), None)?;
        let total = self.executor.run(text, &params, None, None)?.len() as u64;
        Ok((rows.iter().map(shape_row).collect(), total))
    }
}
