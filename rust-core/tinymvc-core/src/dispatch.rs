//! # Dispatcher
//!
//! Resolves one (method, path) pair to exactly one controller action.
//!
//! ## Algorithm
//!
//! 1. Normalize the path (leading/trailing slash stripped, decoded, sanitized)
//! 2. Scan the method's routes in registration order
//! 3. Stop at the first pattern that matches; there is no best-match ranking
//! 4. Invoke the action with the request context and the captured values
//!
//! No match after the full scan is `RouteNotFound`.

use crate::context::Context;
use crate::controller::{Controllers, RouteParams};
use crate::error::{Error, Result};
use crate::response::Response;
use crate::route::{normalize_path, HandlerRef, Method, Route};
use crate::router::RouteTable;
use tracing::{debug, info};

/// Routes plus the actions they point at
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: RouteTable,
    controllers: Controllers,
}

impl Dispatcher {
    /// Pair a route table with its controllers
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerNotFound` for the first route whose action
    /// was never registered.
    pub fn new(routes: RouteTable, controllers: Controllers) -> Result<Self> {
        if let Some(route) = routes.iter().find(|r| !controllers.contains(&r.handler)) {
            return Err(Error::HandlerNotFound {
                handler: route.handler.to_string(),
            });
        }

        info!(
            routes = routes.len(),
            actions = controllers.len(),
            "Dispatcher ready"
        );
        Ok(Self {
            routes,
            controllers,
        })
    }

    /// The route table
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// The controller registry
    #[must_use]
    pub fn controllers(&self) -> &Controllers {
        &self.controllers
    }

    /// Find the route for a raw request path
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` when no route of `method` matches.
    pub fn resolve(&self, method: Method, path: &str) -> Result<(&Route, RouteParams)> {
        self.scan(method, &normalize_path(path))
    }

    /// [`Dispatcher::resolve`] with the method given as text
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedMethodKind` for unknown verbs and
    /// `Error::RouteNotFound` when nothing matches.
    pub fn resolve_str(&self, method: &str, path: &str) -> Result<(&Route, RouteParams)> {
        self.resolve(method.parse()?, path)
    }

    /// First route of `method` matching an already normalized path
    fn scan(&self, method: Method, path: &str) -> Result<(&Route, RouteParams)> {
        for route in self.routes.routes_for(method) {
            if let Some(params) = route.pattern.match_path(path).into_params() {
                debug!(method = %method, path = %path, handler = %route.handler, "Route matched");
                return Ok((route, RouteParams::new(params)));
            }
        }

        Err(Error::RouteNotFound {
            method: method.to_string(),
            path: path.to_string(),
        })
    }

    /// Route the context's request and run the matched action
    ///
    /// # Errors
    ///
    /// `Error::RouteNotFound`, `Error::HandlerNotFound`, or whatever the
    /// action returns.
    pub async fn dispatch(&self, ctx: Context) -> Result<Response> {
        let method = ctx.request().method;
        let (route, params) = self.scan(method, &ctx.request().path)?;
        let action = self.controllers.resolve(&route.handler)?;

        info!(
            method = %method,
            path = %ctx.request().path,
            handler = %route.handler,
            params = params.len(),
            "Dispatching"
        );
        action(ctx, params).await
    }

    /// Reference of the action that would serve `method` + `path`
    ///
    /// # Errors
    ///
    /// As [`Dispatcher::resolve`].
    pub fn handler_for(&self, method: Method, path: &str) -> Result<&HandlerRef> {
        self.resolve(method, path).map(|(route, _)| &route.handler)
    }
}
