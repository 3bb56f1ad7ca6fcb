//! # HTTP Response
//!
//! What a controller hands back: status, body, headers and flash values
//! to store on the session once the handler has returned.

use crate::error::Result;
use crate::json::to_json;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// HTTP response returned by controllers
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Response headers
    pub headers: HashMap<String, String>,
    flashes: Vec<(String, Value)>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "text/html; charset=utf-8".to_string(),
            headers: HashMap::new(),
            flashes: Vec::new(),
        }
    }
}

impl Response {
    /// Create an HTML response
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/plain; charset=utf-8".to_string(),
            ..Self::default()
        }
    }

    /// Create a JSON response from any serializable value
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if `value` can't be serialized.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            body: to_json(value)?,
            content_type: "application/json".to_string(),
            ..Self::default()
        })
    }

    /// `302 Found` to `location`
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        Self::default()
            .with_status(302)
            .with_header("Location", location)
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header; `Content-Type` replaces the content type
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers.insert(key.to_string(), value.to_string());
        }
    }

    /// A header previously set
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Flash `value` under `key` for the next request
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.flashes.push((key.into(), value.into()));
        self
    }

    /// Flash values queued by [`Response::with`]
    #[must_use]
    pub fn flashes(&self) -> &[(String, Value)] {
        &self.flashes
    }

    /// Drain the queued flash values
    pub fn take_flashes(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.flashes)
    }

    /// Whether this is a 3xx response
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                let mut fallback = hyper::Response::new(Full::new(Bytes::from("Internal Server Error")));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}
