//! # Views
//!
//! HTML files under a views directory with `{{ key }}` substitution.
//!
//! - Dots in view names are directories: `errors.404` is `errors/404.html`
//! - `{{ key }}` inserts the HTML-escaped value, `{!! key !!}` inserts it raw
//! - Keys may be dotted to reach nested values (`{{ user.name }}`)

use crate::error::{Error, Result};
use crate::response::Response;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File extension of view files
pub const VIEW_EXTENSION: &str = "html";

/// Statuses with a dedicated error view
pub const ERROR_VIEWS: [u16; 4] = [403, 404, 500, 503];

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{!!\s*([A-Za-z0-9_.]+)\s*!!\}|\{\{\s*([A-Za-z0-9_.]+)\s*\}\}")
        .expect("placeholder pattern is valid")
});

static VIEW_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("view name pattern is valid")
});

/// Escape text for HTML, quotes included
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// View loader rooted at one directory
#[derive(Debug, Clone)]
pub struct Views {
    root: PathBuf,
}

impl Views {
    /// Views under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The views directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing a dotted view name
    ///
    /// # Errors
    ///
    /// Returns `Error::ViewNotFound` for names that aren't dot-separated
    /// plain segments.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        if !VIEW_NAME.is_match(name) {
            return Err(Error::ViewNotFound {
                view: name.to_string(),
            });
        }
        let mut path = self.root.clone();
        path.extend(name.split('.'));
        path.set_extension(VIEW_EXTENSION);
        Ok(path)
    }

    /// Whether the view file exists
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|p| p.is_file())
    }

    /// Render a view with `data`
    ///
    /// `data` should serialize to an object; missing keys render empty.
    ///
    /// # Errors
    ///
    /// Returns `Error::ViewNotFound` when the file doesn't exist,
    /// `Error::Io` when it can't be read and `Error::Json` when `data`
    /// can't be serialized.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        let path = self.path_for(name)?;
        let template = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ViewNotFound {
                view: name.to_string(),
            },
            _ => Error::Io(e),
        })?;
        let data = serde_json::to_value(data)?;
        Ok(interpolate(&template, &data))
    }

    /// Render a view into a 200 HTML response
    ///
    /// # Errors
    ///
    /// As [`Views::render`].
    pub fn response<T: Serialize>(&self, name: &str, data: &T) -> Result<Response> {
        Ok(Response::html(self.render(name, data)?))
    }

    /// Error page for `status`
    ///
    /// Renders `errors.<status>` when that view exists, otherwise a plain
    /// text body with the reason phrase.
    #[must_use]
    pub fn render_error(&self, status: u16) -> Response {
        let reason = hyper::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Error");

        if ERROR_VIEWS.contains(&status) {
            let data = serde_json::json!({ "status": status, "message": reason });
            match self.render(&format!("errors.{status}"), &data) {
                Ok(body) => return Response::html(body).with_status(status),
                Err(Error::ViewNotFound { .. }) => {}
                Err(e) => warn!(status, error = %e, "Error view failed to render"),
            }
        }

        Response::text(format!("{status} {reason}")).with_status(status)
    }
}

fn interpolate(template: &str, data: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            if let Some(key) = caps.get(1) {
                resolve(data, key.as_str())
            } else {
                caps.get(2)
                    .map(|key| escape_html(&resolve(data, key.as_str())))
                    .unwrap_or_default()
            }
        })
        .into_owned()
}

fn resolve(data: &Value, key: &str) -> String {
    let found = key
        .split('.')
        .try_fold(data, |current, part| current.get(part));

    match found {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
