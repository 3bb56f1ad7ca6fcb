//! # tinymvc Core
//!
//! Core library for the tinymvc web framework: a small MVC stack that maps
//! requests to controller actions through a declarative route table and
//! gives those actions a fluent SQL query builder.
//!
//! ## Architecture
//!
//! Routes are loaded once at startup into an immutable [`RouteTable`].
//! For each request the [`Dispatcher`] scans the method's routes in
//! registration order, matches the path with [`PathPattern`] and invokes
//! the first hit's action with a per-request [`Context`] and the captured
//! [`RouteParams`]. Actions talk to the database through [`QueryBuilder`].
//!
//! ## Modules
//!
//! - `matcher` - Segment-wise path pattern matching
//! - `route` / `router` - Route metadata and the per-method route table
//! - `controller` - Name-keyed registry of controller actions
//! - `dispatch` - Match-and-invoke
//! - `query` / `model` - Fluent SQL builder and the `Model` trait
//! - `database` - SQLx connectivity (SQLite, PostgreSQL) with named parameters
//! - `request` / `response` / `context` - Per-request values
//! - `session` / `csrf` / `validation` / `view` - Request collaborators
//! - `config` - TOML configuration
//! - `app` / `server` - Request pipeline and the Hyper front end
//! - `json` - JSON parsing with simd-json
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

extern crate self as tinymvc_core;

pub mod app;
pub mod config;
pub mod context;
pub mod controller;
pub mod csrf;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod json;
pub mod matcher;
pub mod model;
pub mod query;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod session;
pub mod validation;
pub mod view;

pub use app::App;
pub use config::Config;
pub use context::Context;
pub use controller::{handler, Controllers, Handler, RouteParams};
pub use csrf::Csrf;
pub use database::{from_record, BoundParams, DatabasePool, DbValue, Record};
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use json::{parse_json, to_json};
pub use matcher::{match_path, MatchResult, PathPattern};
pub use model::Model;
pub use query::{Operator, QueryBuilder};
pub use request::{Request, UploadedFile};
pub use response::Response;
pub use route::{HandlerRef, Method, Route};
pub use router::RouteTable;
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionStore};
pub use validation::{MessageBag, Rule, Validator};
pub use view::Views;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
