//! Route definitions as they appear in configuration, and the resolved
//! per-route plan the request path consults.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, EngineResult};

pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const DEFAULT_MAX_PAGE_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
        }
    }

    /// Map a request method onto a configurable one. Method tokens are
    /// case-sensitive; anything else can never match a route.
    pub fn from_request(method: &str) -> Option<Self> {
        if method == "GET" {
            Some(HttpMethod::Get)
        } else {
            None
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(alias = "query")]
    pub sql: String,
    /// Declared parameter names; position `i` binds placeholder `$i+1`.
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthPolicy>,
    #[serde(default)]
    pub pagination: Option<PaginationPolicy>,
    #[serde(default)]
    pub response: Option<ResponsePolicy>,
    #[serde(default)]
    pub cache: Option<CachePolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPolicy {
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub header: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_page_limit")]
    pub default_limit: u64,
    #[serde(default = "default_max_page_limit")]
    pub max_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponsePolicy {
    #[serde(default)]
    pub transform: KeyCase,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub wrapper: Option<WrapperKeys>,
}

/// Alternate top-level keys for the response envelope. An unset key drops
/// that slot from the output.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WrapperKeys {
    #[serde(default)]
    pub success: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub meta: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum KeyCase {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "camelCase")]
    CamelCase,
    #[serde(rename = "snake_case")]
    SnakeCase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Time-to-live in whole seconds.
    pub ttl: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

fn default_true() -> bool {
    true
}

fn default_page_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

fn default_max_page_limit() -> u64 {
    DEFAULT_MAX_PAGE_LIMIT
}

// ---------------------------------------------------------------------------
// Resolved plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    ApiKey { header: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    Disabled,
    Enabled(PageLimits),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Disabled,
    Memory { ttl_secs: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldFilter {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseShape {
    pub filter: FieldFilter,
    pub case: KeyCase,
    pub wrapper: Option<WrapperKeys>,
}

/// Every optional policy of a route, resolved once into a concrete behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub auth: AuthMode,
    pub pagination: PaginationMode,
    pub cache: CacheMode,
    pub shape: ResponseShape,
}

impl RoutePlan {
    pub fn resolve(def: &RouteDefinition) -> EngineResult<Self> {
        let label = format!("{} {}", def.method, def.path);

        let auth = match &def.auth {
            Some(policy) if policy.required => AuthMode::ApiKey {
                header: policy
                    .header
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string())
                    .to_ascii_lowercase(),
            },
            _ => AuthMode::Open,
        };

        let pagination = match &def.pagination {
            Some(policy) if policy.enabled => {
                if policy.default_limit < 1 || policy.max_limit < 1 {
                    return Err(EngineError::config(format!(
                        "{label}: pagination limits must be at least 1"
                    )));
                }
                if policy.default_limit > policy.max_limit {
                    return Err(EngineError::config(format!(
                        "{label}: default_limit {} exceeds max_limit {}",
                        policy.default_limit, policy.max_limit
                    )));
                }
                PaginationMode::Enabled(PageLimits {
                    default_limit: policy.default_limit,
                    max_limit: policy.max_limit,
                })
            }
            _ => PaginationMode::Disabled,
        };

        let cache = match &def.cache {
            Some(policy) => {
                if policy.ttl == 0 {
                    return Err(EngineError::config(format!(
                        "{label}: cache ttl must be a positive integer"
                    )));
                }
                match policy.backend {
                    CacheBackend::Memory => CacheMode::Memory {
                        ttl_secs: policy.ttl,
                    },
                    CacheBackend::Redis => {
                        tracing::warn!(route = %label, "redis cache backend is not available, caching disabled");
                        CacheMode::Disabled
                    }
                }
            }
            None => CacheMode::Disabled,
        };

        let shape = match &def.response {
            Some(policy) => {
                let filter = match (&policy.include, &policy.exclude) {
                    (Some(_), Some(_)) => {
                        return Err(EngineError::config(format!(
                            "{label}: response include and exclude are mutually exclusive"
                        )));
                    }
                    (_, Some(exclude)) => FieldFilter::Exclude(exclude.clone()),
                    (Some(include), None) => FieldFilter::Include(include.clone()),
                    (None, None) => FieldFilter::All,
                };
                ResponseShape {
                    filter,
                    case: policy.transform,
                    wrapper: policy.wrapper.clone(),
                }
            }
            None => ResponseShape::default(),
        };

        Ok(RoutePlan {
            auth,
            pagination,
            cache,
            shape,
        })
    }
}
