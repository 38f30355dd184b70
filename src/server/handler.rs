use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, error};

use super::AppState;
use crate::engine::{
    cache_key, compose, pagination, transform_rows, ApiError, CacheMode, HttpMethod,
    PaginationMode, ResponseMeta, ResponseShape, Route,
};
use crate::error::{EngineError, EngineResult};

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// A rendered response as stored in the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: String,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl CachedResponse {
    fn json(status: StatusCode, body: &Value) -> Self {
        Self {
            body: body.to_string(),
            status,
            headers: vec![(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
        }
    }

    fn into_response_with(self, cache_state: Option<&'static str>) -> Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            headers.insert(name, value);
        }
        if let Some(state) = cache_state {
            headers.insert(X_CACHE, HeaderValue::from_static(state));
        }
        response
    }
}

/// Render an error as a JSON response using the given response shape.
pub fn error_response(err: &EngineError, shape: &ResponseShape) -> Response {
    let body = compose(None, shape, Some(ApiError::from(err)), ResponseMeta::now());
    CachedResponse::json(err.status_code(), &body).into_response_with(None)
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        error_response(&self, &ResponseShape::default())
    }
}

/// Fallback handler serving every configured route.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let path = uri.path();
    let route = HttpMethod::from_request(method.as_str())
        .and_then(|m| state.table.match_route(m, path));
    let Some(route) = route else {
        debug!(%method, path, "no route matched");
        return EngineError::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        }
        .into_response();
    };

    if let Err(err) = state.api_keys.authorize(&route.plan.auth, &headers) {
        return error_response(&err, &route.plan.shape);
    }

    let cache = match route.plan.cache {
        CacheMode::Memory { ttl_secs } => {
            let key = cache_key(route.method().as_str(), path, &query);
            if let Some(hit) = state.cache.get(&key) {
                debug!(key = %key, "cache hit");
                return hit.into_response_with(Some("HIT"));
            }
            Some((key, ttl_secs))
        }
        CacheMode::Disabled => None,
    };

    match serve_route(&state, route, path, &query).await {
        Ok(rendered) => match cache {
            Some((key, ttl_secs)) => {
                state.cache.set(key, rendered.clone(), ttl_secs);
                rendered.into_response_with(Some("MISS"))
            }
            None => rendered.into_response_with(None),
        },
        Err(err) => {
            if err.status_code().is_server_error() {
                error!(route = %route.path(), error = %err, "request failed");
            }
            error_response(&err, &route.plan.shape)
        }
    }
}

async fn serve_route(
    state: &AppState,
    route: &Route,
    path: &str,
    query: &[(String, String)],
) -> EngineResult<CachedResponse> {
    let params = route.extract_params(path);
    let mut meta = ResponseMeta::now();
    meta.description = route.definition.description.clone();

    let result = match route.plan.pagination {
        PaginationMode::Enabled(limits) => {
            let request = pagination::parse_request(
                &limits,
                query_value(query, "page"),
                query_value(query, "limit"),
            );
            pagination::validate(&limits, request.page, request.limit)?;
            let (result, total) = state
                .executor
                .execute_paginated(route, &params, &request)
                .await?;
            meta.pagination = Some(pagination::build_result(
                total,
                request.page,
                request.limit,
            ));
            result
        }
        PaginationMode::Disabled => state.executor.execute(route, &params, None).await?,
    };

    meta.count = Some(result.row_count);
    let rows = transform_rows(result.rows, &route.plan.shape);
    let data = Value::Array(rows.into_iter().map(Value::Object).collect());
    let body = compose(Some(data), &route.plan.shape, None, meta);
    Ok(CachedResponse::json(StatusCode::OK, &body))
}

/// First value for `name` in the query string.
fn query_value<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
