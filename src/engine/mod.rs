//! Query routing and execution engine.
//!
//! ```text
//! request ──► RouteTable ──► pagination ──► QueryExecutor
//!                                           │ primary ┐
//!                                           │ count   ┘ (concurrent)
//!                                           ▼
//!                     TtlCache ◄── transform
//! ```
//!
//! The validator runs once per route while the table is built.
pub mod cache;
pub mod executor;
pub mod pagination;
pub mod route;
pub mod route_table;
pub mod transform;
pub mod validator;

pub use cache::{cache_key, TtlCache};
pub use executor::{derive_count_sql, QueryExecutor, QueryResult};
pub use pagination::{PaginationRequest, PaginationResult};
pub use route::*;
pub use route_table::{ExtractedParams, Route, RouteTable};
pub use transform::{compose, transform_rows, ApiError, ApiResponse, ResponseMeta};
pub use validator::{is_valid_sql_query, validate_placeholders};
