use serde::Serialize;

use super::route::PageLimits;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationRequest {
    pub page: u64,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Parse raw `page` / `limit` query values, falling back to defaults and
/// clamping the limit to the route maximum.
pub fn parse_request(
    limits: &PageLimits,
    raw_page: Option<&str>,
    raw_limit: Option<&str>,
) -> PaginationRequest {
    let page = raw_page
        .and_then(|p| p.trim().parse::<u64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);

    let limit = raw_limit
        .and_then(|l| l.trim().parse::<i64>().ok())
        .filter(|l| *l >= 1)
        .map(|l| (l as u64).min(limits.max_limit))
        .unwrap_or(limits.default_limit);

    PaginationRequest {
        page,
        limit,
        offset: offset_for(page, limit).unwrap_or(MAX_OFFSET),
    }
}

/// Largest offset the database accepts (`OFFSET` binds as bigint).
const MAX_OFFSET: u64 = i64::MAX as u64;

fn offset_for(page: u64, limit: u64) -> Option<u64> {
    page.checked_sub(1)?
        .checked_mul(limit)
        .filter(|offset| *offset <= MAX_OFFSET)
}

pub fn validate(limits: &PageLimits, page: u64, limit: u64) -> EngineResult<()> {
    if page < 1 {
        return Err(EngineError::PaginationInvalid(
            "page must be at least 1".to_string(),
        ));
    }
    if limit < 1 {
        return Err(EngineError::PaginationInvalid(
            "limit must be at least 1".to_string(),
        ));
    }
    if limit > limits.max_limit {
        return Err(EngineError::PaginationInvalid(format!(
            "limit must not exceed {}",
            limits.max_limit
        )));
    }
    if offset_for(page, limit).is_none() {
        return Err(EngineError::PaginationInvalid(format!(
            "page {} is out of range",
            page
        )));
    }
    Ok(())
}

pub fn build_result(total: u64, page: u64, limit: u64) -> PaginationResult {
    let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
    PaginationResult {
        page,
        limit,
        total,
        pages,
        has_next: page < pages,
        has_prev: page > 1,
    }
}
