//! # Request Context
//!
//! Everything one request's handler may touch, passed by value instead of
//! living in process-wide globals: the request itself, the caller's
//! session and the shared application (database, config, views).

use crate::app::App;
use crate::config::Config;
use crate::csrf::{Csrf, CSRF_FIELD};
use crate::database::DatabasePool;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::session::{Session, OLD_INPUT_KEY};
use crate::validation::{MessageBag, Validator};
use crate::view::Views;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Per-request context handed to every controller action
#[derive(Debug, Clone)]
pub struct Context {
    request: Request,
    session: Session,
    app: Arc<App>,
}

impl Context {
    /// Bundle a request with its session and the application
    #[must_use]
    pub fn new(request: Request, session: Session, app: Arc<App>) -> Self {
        Self {
            request,
            session,
            app,
        }
    }

    /// The incoming request
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The caller's session
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The shared application
    #[must_use]
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Application configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        self.app.config()
    }

    /// View loader
    #[must_use]
    pub fn views(&self) -> &Views {
        self.app.views()
    }

    /// CSRF issuer bound to the configured session key
    #[must_use]
    pub fn csrf(&self) -> &Csrf {
        self.app.csrf()
    }

    /// Database pool
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionFailed` when no database is configured.
    pub fn db(&self) -> Result<&DatabasePool> {
        self.app.database().ok_or_else(|| Error::ConnectionFailed {
            message: "no database configured".to_string(),
        })
    }

    /// Query or form value
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&str> {
        self.request.input(key)
    }

    /// Validate the request input against `rules`
    ///
    /// # Errors
    ///
    /// `Error::ValidationFailed` with the collected messages (also stored
    /// on the session), or `Error::InvalidRule` for a malformed rule.
    pub async fn validate(&self, rules: &[(&str, &str)]) -> Result<()> {
        Validator::validate(self, rules).await
    }

    /// Check the submitted `csrf_token` field against the session
    ///
    /// # Errors
    ///
    /// Returns `Error::CsrfTokenMismatch` when it is missing or stale.
    pub fn verify_csrf(&self) -> Result<()> {
        self.csrf()
            .verify(&self.session, self.request.input(CSRF_FIELD))
    }

    /// Render a view as a 200 HTML response
    ///
    /// Besides `data`, the view sees `errors` (first message per field
    /// from the last failed validation), `old` (the input submitted with
    /// it), `flash` (one-shot messages) and `csrf_field`.
    ///
    /// # Errors
    ///
    /// `Error::Json` if `data` can't be serialized, otherwise as
    /// [`Views::render`].
    pub fn render<T: Serialize>(&self, view: &str, data: &T) -> Result<Response> {
        let mut object = match serde_json::to_value(data)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        let bag = MessageBag::from_session(&self.session);
        MessageBag::destroy(&self.session);
        let errors: Map<String, Value> = bag
            .all()
            .iter()
            .filter_map(|(field, messages)| {
                messages
                    .first()
                    .map(|m| (field.clone(), Value::String(m.clone())))
            })
            .collect();

        let old = self
            .session
            .take(OLD_INPUT_KEY)
            .unwrap_or(Value::Null);
        let flash = self.session.take_flashes();

        object.entry("errors").or_insert(Value::Object(errors));
        object.entry("old").or_insert(old);
        object.entry("flash").or_insert(Value::Object(flash));
        object.insert(
            "csrf_field".to_string(),
            Value::String(self.csrf().field(&self.session)),
        );

        self.views().response(view, &Value::Object(object))
    }

    /// Consume the context, returning its request
    #[must_use]
    pub fn into_request(self) -> Request {
        self.request
    }
}
