//! # Controllers
//!
//! Name-keyed registry of controller actions.
//!
//! Routes refer to actions as `Controller@action`. Every action is
//! registered here at startup as an async function taking the request
//! [`Context`] and the route's positional [`RouteParams`].
//!
//! ```ignore
//! let mut controllers = Controllers::new();
//! controllers.register("HomeController@show", handler(show))?;
//!
//! async fn show(ctx: Context, params: RouteParams) -> Result<Response> {
//!     let id: i64 = params.parse(0)?;
//!     Ok(Response::text(format!("user {id}")))
//! }
//! ```

use crate::context::Context;
use crate::error::{Error, Result};
use crate::response::Response;
use crate::route::HandlerRef;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

/// Boxed future returned by a handler
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

/// Handler function type (async)
pub type Handler = Arc<dyn Fn(Context, RouteParams) -> HandlerFuture + Send + Sync>;

/// Wrap an async function as a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Context, RouteParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |ctx, params| Box::pin(f(ctx, params)))
}

/// Path values captured by a route's placeholders, in pattern order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    values: Vec<String>,
}

impl RouteParams {
    /// Wrap captured values
    #[must_use]
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the route had no placeholder
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// Value at `index`, parsed
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRouteParam` when the value is missing or
    /// doesn't parse.
    pub fn parse<T: FromStr>(&self, index: usize) -> Result<T> {
        let raw = self.get(index).unwrap_or_default();
        raw.parse().map_err(|_| Error::InvalidRouteParam {
            index,
            value: raw.to_string(),
        })
    }

    /// All values as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.values
    }

    /// Iterate the values in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for RouteParams {
    fn from(values: Vec<String>) -> Self {
        Self::new(values)
    }
}

impl<'a> IntoIterator for &'a RouteParams {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Registry of controller actions
#[derive(Clone, Default)]
pub struct Controllers {
    handlers: HashMap<HandlerRef, Handler>,
}

impl Controllers {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under `Controller@action`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandlerRef` if `reference` isn't in
    /// `Controller@action` form.
    pub fn register(&mut self, reference: &str, handler: Handler) -> Result<&mut Self> {
        let key: HandlerRef = reference.parse()?;
        self.handlers.insert(key, handler);
        Ok(self)
    }

    /// Register an action under an already parsed reference
    pub fn insert(&mut self, reference: HandlerRef, handler: Handler) {
        self.handlers.insert(reference, handler);
    }

    /// Look up an action
    #[must_use]
    pub fn get(&self, reference: &HandlerRef) -> Option<&Handler> {
        self.handlers.get(reference)
    }

    /// Look up an action, failing with `HandlerNotFound`
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerNotFound` when nothing is registered under
    /// `reference`.
    pub fn resolve(&self, reference: &HandlerRef) -> Result<&Handler> {
        self.get(reference).ok_or_else(|| Error::HandlerNotFound {
            handler: reference.to_string(),
        })
    }

    /// Whether an action is registered
    #[must_use]
    pub fn contains(&self, reference: &HandlerRef) -> bool {
        self.handlers.contains_key(reference)
    }

    /// Number of registered actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for Controllers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        names.sort();
        f.debug_struct("Controllers").field("actions", &names).finish()
    }
}
