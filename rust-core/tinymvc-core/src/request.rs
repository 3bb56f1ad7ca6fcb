//! # HTTP Request
//!
//! Per-request input: method, path, query and form fields, headers,
//! cookies, body and attached uploads.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Request only handles request data, not response
//! - **O**: Extensible via new methods without breaking changes
//! - **D**: Handlers never see hyper's request type

use crate::error::{Error, Result};
use crate::json::parse_json_bytes;
use crate::route::{normalize_path, Method};
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// A file attached to the request under a form field name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client-side file name
    pub filename: String,
    /// Declared content type, if any
    pub content_type: Option<String>,
    /// File contents
    pub data: Bytes,
}

impl UploadedFile {
    /// Create an upload from its parts
    pub fn new(filename: impl Into<String>, content_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.map(String::from),
            data: data.into(),
        }
    }

    /// Size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// HTTP request handed to controllers
///
/// - `path` is normalized (no leading/trailing slash, no query, still percent-encoded)
/// - Query and urlencoded form fields are decoded up front, multipart
///   bodies by [`Request::read_multipart`]
/// - The body is collected once and kept as bytes
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Normalized path used for routing
    pub path: String,
    /// Path as received, without query string
    raw_path: String,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    query_params: HashMap<String, String>,
    form_params: HashMap<String, String>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    body: Option<Bytes>,
    files: HashMap<String, UploadedFile>,
}

impl Request {
    /// Build a request by hand (test client, internal use)
    ///
    /// `uri` may carry a query string. Headers that are not valid HTTP
    /// header names or values are skipped.
    #[must_use]
    pub fn new(
        method: Method,
        uri: &str,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let (raw_path, query_string) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (uri.to_string(), None),
        };

        let mut headers = HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self::assemble(method, raw_path, query_string, headers, body)
    }

    /// Create from a hyper request, rejecting bodies over `max_body_size`
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` for oversized bodies,
    /// `Error::RouteNotFound` for verbs the router never serves,
    /// `Error::Http` if the body stream fails and `Error::Multipart` for an
    /// undecodable multipart body.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let uri = req.uri();
        let raw_path = uri.path().to_string();
        let query_string = uri.query().map(String::from);

        let method = Method::try_from(req.method()).map_err(|_| Error::RouteNotFound {
            method: req.method().to_string(),
            path: normalize_path(&raw_path),
        })?;

        let headers = req.headers().clone();
        if let Some(content_len) = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok())
        {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let bytes = BodyExt::collect(req.into_body()).await?.to_bytes();
        if bytes.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: bytes.len(),
            });
        }
        let body = (!bytes.is_empty()).then_some(bytes);

        let mut request = Self::assemble(method, raw_path, query_string, headers, body);
        request.read_multipart().await?;
        Ok(request)
    }

    /// Decode a `multipart/form-data` body into form fields and files
    ///
    /// Parts with a file name become [`UploadedFile`]s, the rest form
    /// fields. Other content types are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Multipart` if the boundary is missing or the body
    /// is malformed.
    pub async fn read_multipart(&mut self) -> Result<()> {
        let boundary = match self.header(CONTENT_TYPE.as_str()) {
            Some(ct) if ct.starts_with(MULTIPART_CONTENT_TYPE) => multer::parse_boundary(ct)?,
            _ => return Ok(()),
        };

        let body = self.body.clone().unwrap_or_default();
        let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(String::from) else {
                continue;
            };
            match field.file_name().map(String::from) {
                Some(filename) => {
                    let content_type = field.content_type().map(ToString::to_string);
                    let data = field.bytes().await?;
                    debug!(field = %name, filename = %filename, size = data.len(), "Received upload");
                    self.files.insert(
                        name,
                        UploadedFile {
                            filename,
                            content_type,
                            data,
                        },
                    );
                }
                None => {
                    let value = field.text().await?;
                    self.form_params.insert(name, value);
                }
            }
        }
        Ok(())
    }

    fn assemble(
        method: Method,
        raw_path: String,
        query_string: Option<String>,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Self {
        let query_params = parse_query_string(query_string.as_deref());

        let is_form = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));
        let form_params = if is_form {
            parse_query_string(body.as_deref().and_then(|b| std::str::from_utf8(b).ok()))
        } else {
            HashMap::new()
        };

        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect();

        Self {
            method,
            path: normalize_path(&raw_path),
            raw_path,
            query_string,
            query_params,
            form_params,
            headers,
            cookies,
            body,
            files: HashMap::new(),
        }
    }

    /// Attach an uploaded file under `field`
    #[must_use]
    pub fn with_file(mut self, field: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(field.into(), file);
        self
    }

    /// Path as received (leading slash, undecoded)
    #[must_use]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Path plus query string, as the client asked for it
    #[must_use]
    pub fn uri(&self) -> Cow<'_, str> {
        match &self.query_string {
            Some(q) => Cow::Owned(format!("{}?{q}", self.raw_path)),
            None => Cow::Borrowed(&self.raw_path),
        }
    }

    /// A form or query field; form fields win
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&str> {
        self.post(key).or_else(|| self.query(key))
    }

    /// Whether `input(key)` has a value
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.input(key).is_some()
    }

    /// All form and query fields merged, form fields winning
    #[must_use]
    pub fn all_input(&self) -> HashMap<String, String> {
        let mut all = self.query_params.clone();
        all.extend(self.form_params.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }

    /// A query string field
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    /// An urlencoded form field
    #[must_use]
    pub fn post(&self, key: &str) -> Option<&str> {
        self.form_params.get(key).map(String::as_str)
    }

    /// Get query parameters as a HashMap
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// A cookie sent by the client
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Whether the client sent or asked for JSON
    #[must_use]
    pub fn is_json(&self) -> bool {
        [ACCEPT, CONTENT_TYPE].iter().any(|name| {
            self.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("application/json"))
        })
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` for a missing or malformed body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        parse_json_bytes(self.body_bytes().unwrap_or_default())
    }

    /// An uploaded file
    #[must_use]
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.get(field)
    }

    /// Whether a non-empty file was uploaded under `field`
    #[must_use]
    pub fn has_file(&self, field: &str) -> bool {
        self.file(field).is_some_and(|f| f.size() > 0)
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

/// Parse query string into HashMap
///
/// Handles URL decoding and duplicate keys (last value wins).
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (url_decode(key), url_decode(value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `+` as space, then percent-decoding; malformed input is kept as is
fn url_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced).map_or_else(|_| spaced.clone(), Cow::into_owned)
}

/// `a=1; b=2` -> [("a", "1"), ("b", "2")]
fn parse_cookie_header(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        Some((name.trim().to_string(), value.trim().to_string()))
    })
}
