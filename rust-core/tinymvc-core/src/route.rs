//! # Route Metadata
//!
//! Single-responsibility module for route information.
//!
//! ## Design Principles
//!
//! - **S**: Route only holds route metadata
//! - **O**: Extensible via additional fields without breaking changes
//! - **D**: Decoupled from dispatch and handler invocation

use crate::error::{Error, Result};
use crate::matcher::PathPattern;
use std::fmt;
use std::str::FromStr;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
}

impl Method {
    /// All recognized verbs, in table order
    pub const ALL: [Self; 4] = [Self::Get, Self::Post, Self::Put, Self::Delete];

    /// Upper-case verb name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::UnsupportedMethodKind {
                method: s.to_string(),
            }),
        }
    }
}

impl TryFrom<&hyper::Method> for Method {
    type Error = Error;

    fn try_from(method: &hyper::Method) -> Result<Self> {
        method.as_str().parse()
    }
}

/// Reference to a controller action, written `Controller@action`
///
/// Resolved against the controller registry, never by reflection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    /// Controller name (e.g. `PagesController`)
    pub controller: String,
    /// Action name (e.g. `about`)
    pub action: String,
}

impl HandlerRef {
    /// Build a reference from its two halves
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
        }
    }
}

impl FromStr for HandlerRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((controller, action))
                if !controller.is_empty() && !action.is_empty() && !action.contains('@') =>
            {
                Ok(Self::new(controller.trim(), action.trim()))
            }
            _ => Err(Error::InvalidHandlerRef {
                reference: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.controller, self.action)
    }
}

/// A registered (method, pattern, handler) triple
#[derive(Debug, Clone)]
pub struct Route {
    /// HTTP method
    pub method: Method,
    /// Pattern as registered (e.g. "/user/{id}")
    pub path_pattern: String,
    /// Compiled, normalized pattern used for matching
    pub pattern: PathPattern,
    /// Controller action to invoke
    pub handler: HandlerRef,
}

impl Route {
    /// Create a route, normalizing and compiling its pattern
    #[must_use]
    pub fn new(method: Method, path: &str, handler: HandlerRef) -> Self {
        Self {
            method,
            path_pattern: path.to_string(),
            pattern: PathPattern::parse(&normalize_path(path)),
            handler,
        }
    }

    /// Whether the pattern has any `{placeholder}` segments
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.pattern.placeholder_count() > 0
    }
}

/// Canonicalize a request path or route pattern for comparison
///
/// Drops the query string and fragment, trims leading and trailing
/// slashes and removes control characters. Percent escapes are kept:
/// segments are decoded one by one when matched.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let path = raw
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    path.trim_matches('/')
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}
