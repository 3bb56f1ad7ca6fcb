//! # tinymvc Site
//!
//! Demo application served by tinymvc: static pages, a couple of dynamic
//! routes and a small users resource backed by SQLite.
//!
//! Everything the binary needs is built here so tests can drive the same
//! application through [`App::handle`] without opening a socket.

use std::path::Path;
use std::sync::Arc;
use tinymvc_core::{App, Config, Controllers, DatabasePool, Dispatcher, RouteTable};

pub mod controllers;
pub mod models;

/// Schema the demo expects
pub const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE
)";

/// Every controller action the route file may name
///
/// # Errors
///
/// Returns `Error::InvalidHandlerRef` if an action name is malformed.
pub fn controllers() -> tinymvc_core::Result<Controllers> {
    let mut registry = Controllers::new();
    controllers::pages::register(&mut registry)?;
    controllers::home::register(&mut registry)?;
    controllers::users::register(&mut registry)?;
    Ok(registry)
}

/// Build the application from a config directory holding `app.toml` and
/// `routes.toml`
///
/// A relative `views.path` is resolved against the config directory's
/// parent.
///
/// # Errors
///
/// Fails when either file is unreadable or invalid, a route names an
/// unregistered action, or the database can't be prepared.
pub async fn build_app(config_dir: &Path) -> anyhow::Result<Arc<App>> {
    let mut config = Config::load(config_dir.join("app.toml"))?;
    if config.views.path.is_relative() {
        let base = config_dir.parent().unwrap_or(config_dir);
        config.views.path = base.join(&config.views.path);
    }

    let routes = RouteTable::load(config_dir.join("routes.toml"))?;
    let dispatcher = Dispatcher::new(routes, controllers()?)?;
    let app = App::from_config(config, dispatcher)?;

    if let Some(db) = app.database() {
        prepare_schema(db).await?;
    }
    Ok(Arc::new(app))
}

/// Create the demo tables when missing
///
/// # Errors
///
/// Returns the database error if the statement fails.
pub async fn prepare_schema(db: &DatabasePool) -> tinymvc_core::Result<()> {
    db.execute(SCHEMA).await?;
    Ok(())
}
