//! Load-time SQL checks for configured routes.
//!
//! The statement filter is lexical, not a parser: keywords are matched as
//! whole words anywhere in the text, including inside string literals and
//! comments.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::route::RouteDefinition;
use crate::error::{EngineError, EngineResult};

static FORBIDDEN_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:insert|update|delete|drop|create|alter|truncate|grant|revoke|exec|execute)\b|\b(?:xp|sp)_",
    )
    .expect("forbidden keyword pattern is valid")
});

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").expect("placeholder pattern is valid"));

/// Whether the statement is an allowed read-only statement.
pub fn is_valid_sql_query(sql: &str) -> bool {
    let normalized = sql.trim().to_lowercase();
    if !(normalized.starts_with("select") || normalized.starts_with("with")) {
        return false;
    }
    !FORBIDDEN_KEYWORDS.is_match(&normalized)
}

/// Distinct placeholder indices used in the statement.
pub fn placeholder_indices(sql: &str) -> EngineResult<BTreeSet<u32>> {
    PLACEHOLDER
        .captures_iter(sql)
        .map(|cap| {
            cap[1].parse::<u32>().map_err(|_| {
                EngineError::config(format!("placeholder ${} is out of range", &cap[1]))
            })
        })
        .collect()
}

/// Check that placeholders `$1..$n` line up with the declared parameter names.
pub fn validate_placeholders(sql: &str, params: &[String]) -> EngineResult<()> {
    let indices = placeholder_indices(sql)?;
    if indices.contains(&0) {
        return Err(EngineError::config(
            "placeholder $0 is invalid; placeholders start at $1",
        ));
    }
    let max_placeholder = indices.iter().next_back().copied().unwrap_or(0);

    match (max_placeholder, params.is_empty()) {
        (0, true) => return Ok(()),
        (0, false) => {
            return Err(EngineError::config(format!(
                "parameters {:?} are declared but the query has no placeholders",
                params
            )));
        }
        (_, true) => {
            return Err(EngineError::config(format!(
                "query uses placeholders up to ${} but declares no parameters",
                max_placeholder
            )));
        }
        _ => {}
    }

    if let Some(missing) = (1..=max_placeholder).find(|i| !indices.contains(i)) {
        return Err(EngineError::config(format!(
            "placeholder ${} is missing; placeholders must run from $1 to ${} without gaps",
            missing, max_placeholder
        )));
    }

    if params.len() != max_placeholder as usize {
        return Err(EngineError::config(format!(
            "query uses {} placeholders but declares {} parameters",
            max_placeholder,
            params.len()
        )));
    }

    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<&str> = params
        .iter()
        .filter(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
        .collect();
    if !duplicates.is_empty() {
        return Err(EngineError::config(format!(
            "duplicate parameter names: {}",
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(())
}

/// Run every SQL check against a route definition.
pub fn validate_route(def: &RouteDefinition) -> EngineResult<()> {
    let label = format!("{} {}", def.method, def.path);
    if !is_valid_sql_query(&def.sql) {
        return Err(EngineError::config(format!(
            "{label}: only single SELECT/WITH statements without modifying keywords are allowed"
        )));
    }
    validate_placeholders(&def.sql, &def.params).map_err(|err| match err {
        EngineError::ConfigValidation(msg) => EngineError::config(format!("{label}: {msg}")),
        other => other,
    })
}
