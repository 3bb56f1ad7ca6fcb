//! # Route Table
//!
//! Routes grouped by HTTP method, kept in registration order.
//!
//! ## Features
//!
//! - Static routes (`/about`) and dynamic routes (`/user/{id}/name/{name}`)
//! - First registered match wins, no priority sorting
//! - Re-registering a (method, pattern) pair replaces the handler in place
//! - Declarative route files loaded once at startup

use crate::error::{Error, Result};
use crate::route::{HandlerRef, Method, Route};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Route storage keyed by method
///
/// Immutable once the route-loading phase is over; lookups hand out
/// restartable iterators.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    method_routes: HashMap<Method, Vec<Route>>,
}

/// One `[[route]]` entry of a route file
#[derive(Debug, Deserialize)]
struct RouteEntry {
    method: String,
    path: String,
    action: String,
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    #[serde(default, rename = "route")]
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route
    ///
    /// An identical (method, pattern) pair overwrites the earlier handler
    /// but keeps its original position in the scan order.
    pub fn register(&mut self, method: Method, path: &str, handler: HandlerRef) {
        let route = Route::new(method, path, handler);
        let routes = self.method_routes.entry(method).or_default();

        if let Some(existing) = routes.iter_mut().find(|r| r.pattern == route.pattern) {
            debug!(method = %method, path = %path, handler = %route.handler, "Route overwritten");
            *existing = route;
        } else {
            debug!(method = %method, path = %path, handler = %route.handler, "Route registered");
            routes.push(route);
        }
    }

    /// Register a route from string parts
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedMethodKind` for verbs outside
    /// GET/POST/PUT/DELETE and `Error::InvalidHandlerRef` for an action not
    /// written `Controller@action`.
    pub fn add(&mut self, method: &str, path: &str, action: &str) -> Result<()> {
        let method: Method = method.parse()?;
        let handler: HandlerRef = action.parse()?;
        self.register(method, path, handler);
        Ok(())
    }

    /// Routes for `method` in registration order
    pub fn routes_for(&self, method: Method) -> impl Iterator<Item = &Route> + '_ {
        self.method_routes
            .get(&method)
            .into_iter()
            .flat_map(|routes| routes.iter())
    }

    /// Routes for a method given as text
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedMethodKind` for unknown verbs.
    pub fn routes_for_str(&self, method: &str) -> Result<impl Iterator<Item = &Route> + '_> {
        let method: Method = method.parse()?;
        Ok(self.routes_for(method))
    }

    /// Every route across all methods
    pub fn iter(&self) -> impl Iterator<Item = &Route> + '_ {
        Method::ALL.into_iter().flat_map(|m| self.routes_for(m))
    }

    /// Total number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.method_routes.values().map(Vec::len).sum()
    }

    /// Whether no route is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convenience method to add a GET route
    pub fn get(&mut self, path: &str, handler: HandlerRef) {
        self.register(Method::Get, path, handler);
    }

    /// Convenience method to add a POST route
    pub fn post(&mut self, path: &str, handler: HandlerRef) {
        self.register(Method::Post, path, handler);
    }

    /// Convenience method to add a PUT route
    pub fn put(&mut self, path: &str, handler: HandlerRef) {
        self.register(Method::Put, path, handler);
    }

    /// Convenience method to add a DELETE route
    pub fn delete(&mut self, path: &str, handler: HandlerRef) {
        self.register(Method::Delete, path, handler);
    }

    /// Parse a TOML route file
    ///
    /// ```toml
    /// [[route]]
    /// method = "GET"
    /// path = "/user/{id}"
    /// action = "HomeController@show"
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for malformed TOML, and the errors of
    /// [`RouteTable::add`] for bad entries.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: RouteFile = toml::from_str(source).map_err(|e| Error::Config {
            message: format!("route file: {e}"),
        })?;

        let mut table = Self::new();
        for entry in file.routes {
            table.add(&entry.method, &entry.path, &entry.action)?;
        }
        Ok(table)
    }

    /// Load a TOML route file from disk
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, otherwise as
    /// [`RouteTable::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
