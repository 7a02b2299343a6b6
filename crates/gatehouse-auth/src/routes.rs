//! Route-pattern authorization
//!
//! A route pattern is a `host + path` template in which `*` matches any run of
//! characters, including `/`. Every other character is literal:
//!
//! | pattern                | target                        | match |
//! |------------------------|-------------------------------|-------|
//! | `example.com/admin/*`  | `example.com/admin/x/y`       | yes   |
//! | `example.com/admin/*`  | `example.com/public`          | no    |
//! | `*.example.com/api/*`  | `eu.example.com/api/v1/users` | yes   |
//! | `example.com/`         | `example.com/`                | yes   |
//!
//! Patterns compile to anchored regular expressions and stay compiled for the
//! life of the [`RouteMatcher`].

use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use serde::Serialize;
use tracing::trace;

use crate::error::RouteError;

/// Outcome of matching a target against a pattern list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDecision {
    /// Whether any pattern matched
    pub is_authorized: bool,
    /// The first pattern that matched
    pub matched_route: Option<String>,
}

impl RouteDecision {
    /// A match on `route`
    #[must_use]
    pub fn allowed(route: impl Into<String>) -> Self {
        Self {
            is_authorized: true,
            matched_route: Some(route.into()),
        }
    }

    /// No match
    #[must_use]
    pub fn denied() -> Self {
        Self {
            is_authorized: false,
            matched_route: None,
        }
    }
}

/// Compiles and caches route patterns
#[derive(Debug, Default)]
pub struct RouteMatcher {
    compiled: DashMap<String, Arc<Regex>>,
}

impl RouteMatcher {
    /// Create a matcher with an empty pattern cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a pattern, reusing a previous compilation when there is one
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Compile`] if the translated expression is
    /// rejected by the regex engine (for example, it exceeds the size limit).
    pub fn compile(&self, pattern: &str) -> Result<Arc<Regex>, RouteError> {
        if let Some(regex) = self.compiled.get(pattern) {
            return Ok(Arc::clone(regex.value()));
        }

        let regex = Arc::new(
            Regex::new(&pattern_to_regex(pattern)).map_err(|source| RouteError::Compile {
                pattern: pattern.to_string(),
                source,
            })?,
        );
        trace!(pattern, "Compiled route pattern");

        Ok(Arc::clone(
            self.compiled
                .entry(pattern.to_string())
                .or_insert(regex)
                .value(),
        ))
    }

    /// Test `target` against `patterns` in order; the first match wins
    ///
    /// No list, or an empty one, is never authorized.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn authorize(
        &self,
        target: &str,
        patterns: Option<&[String]>,
    ) -> Result<RouteDecision, RouteError> {
        let Some(patterns) = patterns else {
            return Ok(RouteDecision::denied());
        };

        for pattern in patterns {
            if self.compile(pattern)?.is_match(target) {
                return Ok(RouteDecision::allowed(pattern.as_str()));
            }
        }

        Ok(RouteDecision::denied())
    }

    /// Number of distinct compiled patterns
    #[must_use]
    pub fn compiled_len(&self) -> usize {
        self.compiled.len()
    }
}

fn pattern_to_regex(pattern: &str) -> String {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for (i, literal) in pattern.split('*').enumerate() {
        if i > 0 {
            expr.push_str(".*");
        }
        expr.push_str(&regex::escape(literal));
    }
    expr.push('$');
    expr
}

/// The `host + path` a request is authorized against
///
/// The host is lowercased and `.`/`..` path segments are resolved. Scheme,
/// port, query and fragment never take part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTarget {
    host: String,
    path: String,
}

impl RequestTarget {
    /// Build from a host (optionally with a port) and a path (optionally with a query)
    pub fn new(host: &str, path: &str) -> Self {
        Self {
            host: strip_port(host.trim()).to_ascii_lowercase(),
            path: normalize_path(path),
        }
    }

    /// Build from a URI, falling back to `host_header` for origin-form URIs
    ///
    /// Returns `None` when no host can be determined.
    pub fn from_uri(uri: &http::Uri, host_header: Option<&str>) -> Option<Self> {
        let host = uri.host().or(host_header)?;
        if host.trim().is_empty() {
            return None;
        }
        Some(Self::new(host, uri.path()))
    }

    /// Lowercased hostname
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path without query, dot segments resolved
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host + path`, the string patterns are matched against
    pub fn as_match_string(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

impl std::fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literal
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Drop query and fragment, then resolve `.` and `..` segments the way a URL
/// parser does. `%2e` counts as a dot and `..` never climbs above the root.
fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.strip_prefix('/').unwrap_or(path);

    let mut resolved: Vec<&str> = Vec::new();
    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        match dot_segment(segment) {
            Some(DotSegment::Parent) => {
                resolved.pop();
                if last {
                    resolved.push("");
                }
            }
            Some(DotSegment::Current) => {
                if last {
                    resolved.push("");
                }
            }
            None => resolved.push(segment),
        }
    }
    format!("/{}", resolved.join("/"))
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    if segment.len() > 6 || !(segment.starts_with('.') || segment.starts_with('%')) {
        return None;
    }
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}
