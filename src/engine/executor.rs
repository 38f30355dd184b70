//! Parameter binding, statement execution and count derivation.
//!
//! Request values only ever reach the database as bound parameters. The
//! statement text is either the configured SQL, that SQL with a trailing
//! `LIMIT`/`OFFSET` pair of fresh placeholders, or a `COUNT(*)` statement
//! sliced out of the configured SQL.
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::pagination::PaginationRequest;
use super::route::PaginationMode;
use super::route_table::{ExtractedParams, Route};
use crate::db::{DbFailure, JsonRow, QueryBackend};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<JsonRow>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(rows: Vec<JsonRow>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }
}

/// Statement text plus its ordered parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<String>,
}

/// Values for the declared parameters, in declaration order.
pub fn bind_params(declared: &[String], extracted: &ExtractedParams) -> EngineResult<Vec<String>> {
    declared
        .iter()
        .map(|name| {
            extracted
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::MissingParameter(name.clone()))
        })
        .collect()
}

/// Append `LIMIT`/`OFFSET` placeholders unless the statement already mentions
/// either keyword anywhere in its text.
pub fn build_statement(
    sql: &str,
    mut params: Vec<String>,
    pagination: Option<&PaginationRequest>,
) -> BoundStatement {
    let Some(page) = pagination else {
        return BoundStatement {
            sql: sql.to_string(),
            params,
        };
    };

    let lowered = sql.to_ascii_lowercase();
    if lowered.contains("limit") || lowered.contains("offset") {
        return BoundStatement {
            sql: sql.to_string(),
            params,
        };
    }

    let next = params.len() + 1;
    let sql = format!(
        "{} LIMIT ${} OFFSET ${}",
        sql.trim_end().trim_end_matches(';').trim_end(),
        next,
        next + 1
    );
    params.push(page.limit.to_string());
    params.push(page.offset.to_string());
    BoundStatement { sql, params }
}

/// Slice a `SELECT COUNT(*)` statement out of a configured statement: keep
/// everything from the first `from`, cut before `order by`, else before
/// `limit`.
pub fn derive_count_sql(sql: &str) -> EngineResult<String> {
    // ASCII lowering keeps byte offsets aligned with the original text
    let lowered = sql.to_ascii_lowercase();
    if !lowered.contains("select") {
        return Err(EngineError::CountDerivation(
            "statement has no SELECT keyword".to_string(),
        ));
    }
    let from = lowered.find("from").ok_or_else(|| {
        EngineError::CountDerivation("statement has no FROM clause".to_string())
    })?;

    let clause = &sql[from..];
    let clause_lowered = &lowered[from..];
    let end = clause_lowered
        .find("order by")
        .or_else(|| clause_lowered.find("limit"))
        .unwrap_or(clause.len());

    let clause = clause[..end].trim_end().trim_end_matches(';').trim_end();
    Ok(format!("SELECT COUNT(*) AS total {}", clause))
}

/// Read the `total` column of a count result; anything unusable counts as 0.
fn parse_total(rows: &[JsonRow]) -> u64 {
    match rows.first().and_then(|row| row.get("total")) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn execution_error(failure: DbFailure) -> EngineError {
    EngineError::QueryExecution {
        details: failure.details(),
        message: failure.message,
    }
}

#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn QueryBackend>,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn QueryBackend> {
        &self.backend
    }

    /// Run the primary statement. Pagination augmentation only applies when
    /// the route enables it and a page request is supplied.
    pub async fn execute(
        &self,
        route: &Route,
        params: &ExtractedParams,
        pagination: Option<&PaginationRequest>,
    ) -> EngineResult<QueryResult> {
        let values = bind_params(&route.definition.params, params)?;
        let pagination = match route.plan.pagination {
            PaginationMode::Enabled(_) => pagination,
            PaginationMode::Disabled => None,
        };
        let statement = build_statement(&route.definition.sql, values, pagination);
        debug!(route = %route.path(), sql = %statement.sql, "executing query");

        let rows = self
            .backend
            .query(&statement.sql, &statement.params)
            .await
            .map_err(|failure| {
                warn!(route = %route.path(), error = %failure, "query failed");
                execution_error(failure)
            })?;
        Ok(QueryResult::new(rows))
    }

    /// Count the rows the configured statement would return without paging.
    /// Failures degrade to 0 so they never block the primary rows.
    pub async fn execute_count(&self, route: &Route, params: &ExtractedParams) -> u64 {
        let count_sql = match derive_count_sql(&route.definition.sql) {
            Ok(sql) => sql,
            Err(err) => {
                warn!(route = %route.path(), error = %err, "count derivation failed, reporting 0");
                return 0;
            }
        };
        let values = match bind_params(&route.definition.params, params) {
            Ok(values) => values,
            Err(_) => return 0,
        };

        match self.backend.query(&count_sql, &values).await {
            Ok(rows) => parse_total(&rows),
            Err(failure) => {
                warn!(route = %route.path(), error = %failure, "count query failed, reporting 0");
                0
            }
        }
    }

    /// Run the primary and count statements concurrently.
    pub async fn execute_paginated(
        &self,
        route: &Route,
        params: &ExtractedParams,
        pagination: &PaginationRequest,
    ) -> EngineResult<(QueryResult, u64)> {
        let (result, total) = tokio::join!(
            self.execute(route, params, Some(pagination)),
            self.execute_count(route, params)
        );
        Ok((result?, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockBackend;
    use crate::engine::route::RouteDefinition;
    use serde_json::json;

    fn route(toml_src: &str) -> Route {
        let def: RouteDefinition = toml::from_str(toml_src).unwrap();
        Route::new(def).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> ExtractedParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const PAGE_2: PaginationRequest = PaginationRequest {
        page: 2,
        limit: 10,
        offset: 10,
    };

    #[test]
    fn test_bind_params_in_declaration_order() {
        let declared = vec!["b".to_string(), "a".to_string()];
        let values = bind_params(&declared, &params(&[("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(values, vec!["2", "1"]);
    }

    #[test]
    fn test_bind_params_missing() {
        let declared = vec!["id".to_string()];
        let err = bind_params(&declared, &params(&[])).unwrap_err();
        assert!(matches!(err, EngineError::MissingParameter(ref name) if name == "id"));
    }

    #[test]
    fn test_build_statement_appends_limit_offset() {
        let stmt = build_statement(
            "SELECT * FROM posts WHERE user_id = $1",
            vec!["7".into()],
            Some(&PAGE_2),
        );
        assert_eq!(
            stmt.sql,
            "SELECT * FROM posts WHERE user_id = $1 LIMIT $2 OFFSET $3"
        );
        assert_eq!(stmt.params, vec!["7", "10", "10"]);
    }

    #[test]
    fn test_build_statement_strips_trailing_semicolon() {
        let stmt = build_statement("SELECT * FROM posts;", vec![], Some(&PAGE_2));
        assert_eq!(stmt.sql, "SELECT * FROM posts LIMIT $1 OFFSET $2");
    }

    #[test]
    fn test_build_statement_skips_when_limit_present() {
        let sql = "SELECT * FROM posts ORDER BY id LIMIT 5";
        let stmt = build_statement(sql, vec![], Some(&PAGE_2));
        assert_eq!(stmt.sql, sql);
        assert!(stmt.params.is_empty());

        // Substring match, even inside an identifier
        let sql = "SELECT offset_minutes FROM zones";
        assert_eq!(build_statement(sql, vec![], Some(&PAGE_2)).sql, sql);
    }

    #[test]
    fn test_build_statement_without_pagination() {
        let stmt = build_statement("SELECT 1", vec![], None);
        assert_eq!(stmt.sql, "SELECT 1");
    }

    #[test]
    fn test_derive_count_sql() {
        assert_eq!(
            derive_count_sql(
                "SELECT id, name FROM users WHERE active = $1 ORDER BY name LIMIT 10"
            )
            .unwrap(),
            "SELECT COUNT(*) AS total FROM users WHERE active = $1"
        );
        assert_eq!(
            derive_count_sql("select id from users limit 5").unwrap(),
            "SELECT COUNT(*) AS total from users"
        );
        assert_eq!(
            derive_count_sql("SELECT id FROM users WHERE a = $1").unwrap(),
            "SELECT COUNT(*) AS total FROM users WHERE a = $1"
        );
    }

    #[test]
    fn test_derive_count_sql_unsupported_shape() {
        assert!(matches!(
            derive_count_sql("WITH x AS (VALUES (1)) TABLE x"),
            Err(EngineError::CountDerivation(_))
        ));
        assert!(derive_count_sql("SELECT 1").is_err());
    }

    #[test]
    fn test_parse_total() {
        let row = |v: Value| {
            let mut r = JsonRow::new();
            r.insert("total".into(), v);
            vec![r]
        };
        assert_eq!(parse_total(&row(json!(42))), 42);
        assert_eq!(parse_total(&row(json!("17"))), 17);
        assert_eq!(parse_total(&row(json!("lots"))), 0);
        assert_eq!(parse_total(&row(json!(-3))), 0);
        assert_eq!(parse_total(&[]), 0);
    }

    #[tokio::test]
    async fn test_execute_binds_path_params() {
        let backend = Arc::new(MockBackend::with_rows(vec![json!({"id": 42})]));
        let executor = QueryExecutor::new(backend.clone());
        let route = route(
            r#"
            path = "/users/:id"
            sql = "SELECT * FROM users WHERE id = $1"
            params = ["id"]
            "#,
        );

        let result = executor
            .execute(&route, &params(&[("id", "42")]), None)
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        let calls = backend.calls();
        assert_eq!(calls[0].0, "SELECT * FROM users WHERE id = $1");
        assert_eq!(calls[0].1, vec!["42"]);
    }

    #[tokio::test]
    async fn test_execute_ignores_pagination_when_disabled() {
        let backend = Arc::new(MockBackend::default());
        let executor = QueryExecutor::new(backend.clone());
        let route = route("path = \"/users\"\nsql = \"SELECT * FROM users\"");

        executor
            .execute(&route, &params(&[]), Some(&PAGE_2))
            .await
            .unwrap();
        assert_eq!(backend.calls()[0].0, "SELECT * FROM users");
    }

    #[tokio::test]
    async fn test_execute_wraps_driver_failure() {
        let backend = Arc::new(MockBackend::failing("relation \"users\" does not exist"));
        let executor = QueryExecutor::new(backend);
        let route = route("path = \"/users\"\nsql = \"SELECT * FROM users\"");

        let err = executor.execute(&route, &params(&[]), None).await.unwrap_err();
        match err {
            EngineError::QueryExecution { message, .. } => {
                assert_eq!(message, "relation \"users\" does not exist")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_paginated_runs_both_statements() {
        let backend = Arc::new(
            MockBackend::with_rows(vec![json!({"id": 1}), json!({"id": 2})]).total(json!("25")),
        );
        let executor = QueryExecutor::new(backend.clone());
        let route = route(
            r#"
            path = "/users/:org"
            sql = "SELECT id FROM users WHERE org = $1 ORDER BY id"
            params = ["org"]
            pagination = { enabled = true }
            "#,
        );

        let (result, total) = executor
            .execute_paginated(&route, &params(&[("org", "acme")]), &PAGE_2)
            .await
            .unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(total, 25);

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        let count_call = calls
            .iter()
            .find(|(sql, _)| sql.starts_with("SELECT COUNT"))
            .unwrap();
        assert_eq!(
            count_call.0,
            "SELECT COUNT(*) AS total FROM users WHERE org = $1"
        );
        assert_eq!(count_call.1, vec!["acme"]);
    }

    #[tokio::test]
    async fn test_count_failure_degrades_to_zero() {
        let backend = Arc::new(
            MockBackend::with_rows(vec![json!({"id": 1})]).failing_count(),
        );
        let executor = QueryExecutor::new(backend);
        let route = route(
            "path = \"/users\"\nsql = \"SELECT id FROM users\"\npagination = { enabled = true }",
        );

        let (result, total) = executor
            .execute_paginated(&route, &params(&[]), &PAGE_2)
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(total, 0);
    }
}
