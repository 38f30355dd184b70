//! In-memory [`QueryBackend`] for tests.
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use super::{DbFailure, JsonRow, QueryBackend};

#[derive(Default)]
pub struct MockBackend {
    rows: Vec<JsonRow>,
    total: Option<Value>,
    failure: Option<String>,
    count_failure: bool,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockBackend {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn total(mut self, total: Value) -> Self {
        self.total = Some(total);
        self
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_count(mut self) -> Self {
        self.count_failure = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl QueryBackend for MockBackend {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<JsonRow>, DbFailure> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));

        if let Some(message) = &self.failure {
            return Err(DbFailure::from_string(message.clone()));
        }
        if sql.starts_with("SELECT COUNT(*) AS total") {
            if self.count_failure {
                return Err(DbFailure::from_string("count failed"));
            }
            let mut row = JsonRow::new();
            if let Some(total) = &self.total {
                row.insert("total".to_string(), total.clone());
            }
            return Ok(vec![row]);
        }
        Ok(self.rows.clone())
    }
}
