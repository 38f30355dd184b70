//! Row shaping and response envelope composition.
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::pagination::PaginationResult;
use super::route::{FieldFilter, KeyCase, ResponseShape};
use crate::db::JsonRow;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&EngineError> for ApiError {
    fn from(err: &EngineError) -> Self {
        ApiError {
            message: err.to_string(),
            code: err.code().as_str().to_string(),
            details: err.details().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResponseMeta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            count: None,
            pagination: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub meta: ResponseMeta,
}

/// Apply the field filter and key-case transform to every row.
pub fn transform_rows(rows: Vec<JsonRow>, shape: &ResponseShape) -> Vec<JsonRow> {
    rows.into_iter()
        .map(|row| {
            let filtered = filter_fields(row, &shape.filter);
            match shape.case {
                KeyCase::None => filtered,
                case => transform_object(filtered, case),
            }
        })
        .collect()
}

fn filter_fields(row: JsonRow, filter: &FieldFilter) -> JsonRow {
    match filter {
        FieldFilter::All => row,
        FieldFilter::Exclude(fields) => row
            .into_iter()
            .filter(|(key, _)| !fields.contains(key))
            .collect(),
        FieldFilter::Include(fields) => row
            .into_iter()
            .filter(|(key, _)| fields.contains(key))
            .collect(),
    }
}

fn transform_object(object: Map<String, Value>, case: KeyCase) -> Map<String, Value> {
    object
        .into_iter()
        .map(|(key, value)| (convert_key(&key, case), transform_value(value, case)))
        .collect()
}

fn transform_value(value: Value, case: KeyCase) -> Value {
    match value {
        Value::Object(object) => Value::Object(transform_object(object, case)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| transform_value(item, case))
                .collect(),
        ),
        scalar => scalar,
    }
}

pub fn convert_key(key: &str, case: KeyCase) -> String {
    match case {
        KeyCase::None => key.to_string(),
        KeyCase::CamelCase => to_camel_case(key),
        KeyCase::SnakeCase => to_snake_case(key),
    }
}

/// `_x` becomes `X`; underscores not followed by a lowercase letter stay.
fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('_', Some(next)) if next.is_ascii_lowercase() => {
                out.push(next.to_ascii_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Build the response body. With a wrapper, `success`/`data`/`meta` move to
/// the configured keys and slots without a key are dropped; `error` always
/// stays under `error`.
pub fn compose(
    data: Option<Value>,
    shape: &ResponseShape,
    error: Option<ApiError>,
    meta: ResponseMeta,
) -> Value {
    let response = ApiResponse {
        success: error.is_none(),
        data,
        error,
        meta,
    };

    let Some(wrapper) = &shape.wrapper else {
        return serde_json::to_value(&response).unwrap_or_default();
    };

    let mut body = Map::new();
    if let Some(key) = &wrapper.success {
        body.insert(key.clone(), Value::Bool(response.success));
    }
    if let (Some(key), Some(data)) = (&wrapper.data, response.data) {
        body.insert(key.clone(), data);
    }
    if let Some(error) = &response.error {
        body.insert(
            "error".to_string(),
            serde_json::to_value(error).unwrap_or_default(),
        );
    }
    if let Some(key) = &wrapper.meta {
        body.insert(
            key.clone(),
            serde_json::to_value(&response.meta).unwrap_or_default(),
        );
    }
    Value::Object(body)
}
