use std::collections::{HashMap, HashSet};

use super::route::{HttpMethod, RouteDefinition, RoutePlan};
use super::validator;
use crate::error::{EngineError, EngineResult};

/// Parameter name to raw path segment, for a single request.
pub type ExtractedParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A validated route with its resolved plan.
#[derive(Debug, Clone)]
pub struct Route {
    pub definition: RouteDefinition,
    pub plan: RoutePlan,
    segments: Vec<Segment>,
}

impl Route {
    pub fn new(definition: RouteDefinition) -> EngineResult<Self> {
        if !definition.path.starts_with('/') {
            return Err(EngineError::config(format!(
                "route path {:?} must start with '/'",
                definition.path
            )));
        }
        validator::validate_route(&definition)?;
        let plan = RoutePlan::resolve(&definition)?;
        let segments = split_path(&definition.path)
            .map(|seg| match seg.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(seg.to_string()),
            })
            .collect();
        Ok(Self {
            definition,
            plan,
            segments,
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.definition.method
    }

    pub fn path(&self) -> &str {
        &self.definition.path
    }

    pub fn matches(&self, path: &str) -> bool {
        let request: Vec<&str> = split_path(path).collect();
        if request.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(request)
            .all(|(segment, actual)| match segment {
                Segment::Param(_) => !actual.is_empty(),
                Segment::Literal(expected) => expected == actual,
            })
    }

    /// Bind every `:name` segment to the request segment in the same position.
    pub fn extract_params(&self, path: &str) -> ExtractedParams {
        self.segments
            .iter()
            .zip(split_path(path))
            .filter_map(|(segment, actual)| match segment {
                Segment::Param(name) => Some((name.clone(), actual.to_string())),
                Segment::Literal(_) => None,
            })
            .collect()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Ordered, immutable set of routes. Declaration order decides which route
/// wins when several match.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(definitions: Vec<RouteDefinition>) -> EngineResult<Self> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert((definition.method, definition.path.clone())) {
                return Err(EngineError::config(format!(
                    "duplicate route {} {}",
                    definition.method, definition.path
                )));
            }
            routes.push(Route::new(definition)?);
        }
        Ok(Self { routes })
    }

    pub fn match_route(&self, method: HttpMethod, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| route.method() == method && route.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
