use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use deadpool_postgres::{Pool, PoolError};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::error::Error as StdError;
use std::fmt;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

/// One result row, keyed by column name in select-list order.
pub type JsonRow = Map<String, Value>;

/// Categorized error types for SQL query failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE 42601 and friends)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, bad input syntax)
    Execution,
    Transaction,
    /// Connection, pool and protocol errors
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "syntax"),
            ErrorCategory::Semantic => write!(f, "semantic"),
            ErrorCategory::Execution => write!(f, "execution"),
            ErrorCategory::Transaction => write!(f, "transaction"),
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// A database failure with whatever context the server reported.
#[derive(Debug, Clone)]
pub struct DbFailure {
    pub category: ErrorCategory,
    /// SQLSTATE error code, empty for non-database failures
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
}

impl DbFailure {
    pub fn from_pg_error(err: &tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code().to_string();
            DbFailure {
                category: categorize_sqlstate(&code),
                code,
                message: db_err.message().to_string(),
                detail: db_err.detail().map(|s| s.to_string()),
                hint: db_err.hint().map(|s| s.to_string()),
            }
        } else {
            let category = if err.source().is_some() {
                ErrorCategory::Connection
            } else {
                ErrorCategory::Unknown
            };
            DbFailure {
                category,
                code: String::new(),
                message: err.to_string(),
                detail: err.source().map(|e| e.to_string()),
                hint: None,
            }
        }
    }

    pub fn from_pool_error(err: PoolError) -> Self {
        let message = match &err {
            PoolError::Timeout(_) => "timed out waiting for a database connection".to_string(),
            PoolError::Closed => "database connection pool is closed".to_string(),
            other => format!("failed to acquire database connection: {}", other),
        };
        DbFailure {
            category: ErrorCategory::Connection,
            code: String::new(),
            message,
            detail: None,
            hint: None,
        }
    }

    pub fn from_string(msg: impl Into<String>) -> Self {
        DbFailure {
            category: ErrorCategory::Unknown,
            code: String::new(),
            message: msg.into(),
            detail: None,
            hint: None,
        }
    }

    /// Structured context for the `details` slot of an error response.
    pub fn details(&self) -> Option<Value> {
        let mut details = Map::new();
        if !self.code.is_empty() {
            details.insert("sqlstate".into(), json!(self.code));
        }
        if self.category != ErrorCategory::Unknown {
            details.insert("category".into(), json!(self.category.to_string()));
        }
        if let Some(detail) = &self.detail {
            details.insert("detail".into(), json!(detail));
        }
        if let Some(hint) = &self.hint {
            details.insert("hint".into(), json!(hint));
        }
        if details.is_empty() {
            None
        } else {
            Some(Value::Object(details))
        }
    }
}

impl fmt::Display for DbFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for DbFailure {}

/// Categorize a SQLSTATE code into an ErrorCategory.
fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        "42" => {
            if code == "42601" || code == "42000" {
                ErrorCategory::Syntax
            } else {
                ErrorCategory::Semantic
            }
        }
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

/// Executes a single parameterized read statement.
///
/// Parameters are always passed as text in placeholder order; the backend is
/// responsible for binding them through its driver, never by splicing them
/// into the statement.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<JsonRow>, DbFailure>;

    async fn ping(&self) -> Result<(), DbFailure> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }
}

/// [`QueryBackend`] over a deadpool-managed PostgreSQL pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl QueryBackend for PgBackend {
    async fn query(&self, sql: &str, params: &[String]) -> Result<Vec<JsonRow>, DbFailure> {
        let client = self.pool.get().await.map_err(DbFailure::from_pool_error)?;
        let statement = client
            .prepare_cached(sql)
            .await
            .map_err(|e| DbFailure::from_pg_error(&e))?;

        let types = statement.params();
        if types.len() != params.len() {
            return Err(DbFailure::from_string(format!(
                "bind message supplies {} parameters, but prepared statement requires {}",
                params.len(),
                types.len()
            )));
        }

        let bound = types
            .iter()
            .zip(params)
            .map(|(ty, raw)| bind_text(raw, ty))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|value| value.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(&statement, &refs)
            .await
            .map_err(|e| DbFailure::from_pg_error(&e))?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

type BoundValue = Box<dyn ToSql + Sync + Send>;

/// Convert a textual request value into the type the server inferred for
/// its placeholder.
pub fn bind_text(raw: &str, ty: &Type) -> Result<BoundValue, DbFailure> {
    let invalid = |type_name: &str| {
        DbFailure {
            category: ErrorCategory::Execution,
            code: "22P02".to_string(),
            message: format!("invalid input syntax for type {}: \"{}\"", type_name, raw),
            detail: None,
            hint: None,
        }
    };

    let value: BoundValue = match *ty {
        Type::BOOL => Box::new(parse_bool(raw).ok_or_else(|| invalid("boolean"))?),
        Type::INT2 => Box::new(raw.trim().parse::<i16>().map_err(|_| invalid("smallint"))?),
        Type::INT4 => Box::new(raw.trim().parse::<i32>().map_err(|_| invalid("integer"))?),
        Type::INT8 => Box::new(raw.trim().parse::<i64>().map_err(|_| invalid("bigint"))?),
        Type::FLOAT4 => Box::new(raw.trim().parse::<f32>().map_err(|_| invalid("real"))?),
        Type::FLOAT8 => Box::new(
            raw.trim()
                .parse::<f64>()
                .map_err(|_| invalid("double precision"))?,
        ),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Box::new(raw.to_string())
        }
        Type::JSON | Type::JSONB => Box::new(
            serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        ),
        Type::NUMERIC => Box::new(parse_decimal(raw).ok_or_else(|| invalid("numeric"))?),
        Type::UUID => Box::new(Uuid::parse_str(raw.trim()).map_err(|_| invalid("uuid"))?),
        Type::DATE => Box::new(
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| invalid("date"))?,
        ),
        Type::TIMESTAMP => Box::new(
            NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S%.f"))
                .map_err(|_| invalid("timestamp"))?,
        ),
        Type::TIMESTAMPTZ => Box::new(
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid("timestamp with time zone"))?,
        ),
        ref other => {
            return Err(DbFailure {
                category: ErrorCategory::Execution,
                code: String::new(),
                message: format!(
                    "parameters of type {} cannot be bound from request values",
                    other.name()
                ),
                detail: None,
                hint: Some("cast the placeholder in the query, e.g. $1::text".to_string()),
            });
        }
    };
    Ok(value)
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Numerics render as strings so no precision is lost on the way to JSON.
fn decimal_to_json(value: Decimal) -> Value {
    Value::String(value.normalize().to_string())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn row_to_json(row: &Row) -> JsonRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), extract_value(row, i, col.type_())))
        .collect()
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> Value {
    fn get<'a, T>(row: &'a Row, idx: usize) -> Option<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).ok().flatten()
    }

    let value = match *pg_type {
        Type::BOOL => get::<bool>(row, idx).map(Value::from),
        Type::INT2 => get::<i16>(row, idx).map(Value::from),
        Type::INT4 => get::<i32>(row, idx).map(Value::from),
        Type::INT8 => get::<i64>(row, idx).map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx).map(|f| json!(f)),
        Type::FLOAT8 => get::<f64>(row, idx).map(|f| json!(f)),
        Type::NUMERIC => get::<Decimal>(row, idx).map(decimal_to_json),
        Type::UUID => get::<Uuid>(row, idx).map(|u| Value::String(u.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx).map(Value::from),
        Type::DATE => get::<NaiveDate>(row, idx).map(|d| Value::String(d.to_string())),
        Type::TIME => get::<NaiveTime>(row, idx).map(|t| Value::String(t.to_string())),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
        Type::JSON | Type::JSONB => get::<Value>(row, idx),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            get::<Vec<Option<String>>>(row, idx).map(|items| json!(items))
        }
        Type::INT4_ARRAY => get::<Vec<Option<i32>>>(row, idx).map(|items| json!(items)),
        Type::INT8_ARRAY => get::<Vec<Option<i64>>>(row, idx).map(|items| json!(items)),
        // Fallback: try to get as string
        _ => get::<String>(row, idx).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}
