//! API-key checks for routes that require authentication.
use axum::http::HeaderMap;
use std::collections::HashSet;
use subtle::{Choice, ConstantTimeEq};

use crate::engine::AuthMode;
use crate::error::{EngineError, EngineResult};

/// Immutable set of accepted API keys, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct ApiKeySet {
    keys: HashSet<String>,
}

impl ApiKeySet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Constant-time in the key contents: every configured key is compared
    /// in full, whichever one matches.
    pub fn contains(&self, key: &str) -> bool {
        let supplied = key.as_bytes();
        self.keys
            .iter()
            .fold(Choice::from(0), |found, candidate| {
                found | candidate.as_bytes().ct_eq(supplied)
            })
            .into()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn authorize(&self, mode: &AuthMode, headers: &HeaderMap) -> EngineResult<()> {
        let header = match mode {
            AuthMode::Open => return Ok(()),
            AuthMode::ApiKey { header } => header,
        };
        let supplied = headers
            .get(header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| EngineError::Unauthorized(format!("missing API key header {header}")))?;

        if self.contains(supplied) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized("invalid API key".to_string()))
        }
    }
}
