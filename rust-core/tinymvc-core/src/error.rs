//! # Error Handling
//!
//! Centralized error types for tinymvc core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Routing and query-building errors are programmer/configuration errors
//! and abort the request. `QueryExecutionFailed` is the one data-dependent
//! error and is always propagated to the caller.

use crate::validation::MessageBag;
use thiserror::Error;

/// Result type alias for tinymvc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the tinymvc runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No registered route matches method + path
    #[error("No route found for {method} /{path}")]
    RouteNotFound {
        /// Request method
        method: String,
        /// The normalized path that wasn't matched
        path: String,
    },

    /// A route references a controller action that was never registered
    #[error("Handler not found: {handler}")]
    HandlerNotFound {
        /// The `Controller@action` reference
        handler: String,
    },

    /// A path parameter didn't parse as the type the handler wants
    #[error("Invalid route parameter #{index}: {value:?}")]
    InvalidRouteParam {
        /// Position among the route's placeholders
        index: usize,
        /// The raw segment
        value: String,
    },

    /// HTTP verb outside GET/POST/PUT/DELETE
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethodKind {
        /// The rejected verb
        method: String,
    },

    /// Handler reference not in `Controller@action` form
    #[error("Invalid handler reference: {reference}")]
    InvalidHandlerRef {
        /// The malformed reference
        reference: String,
    },

    /// Comparison operator not in the allowed set
    #[error("Invalid operator: {operator}")]
    InvalidOperator {
        /// The rejected operator
        operator: String,
    },

    /// Table or column name that is not a plain SQL identifier
    #[error("Invalid SQL identifier: {identifier}")]
    InvalidIdentifier {
        /// The rejected identifier
        identifier: String,
    },

    /// SQL references a placeholder with no bound value
    #[error("No value bound for placeholder :{name}")]
    UnboundParameter {
        /// Placeholder name without the leading colon
        name: String,
    },

    /// An update was asked to change no columns
    #[error("Nothing to update in {table}")]
    EmptyUpdate {
        /// Target table
        table: String,
    },

    /// The database rejected or failed to run a statement
    #[error("Query execution failed: {message}")]
    QueryExecutionFailed {
        /// Driver message
        message: String,
    },

    /// The database could not be reached
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        /// Driver message
        message: String,
    },

    /// One or more validation rules failed
    #[error("Validation failed for {} field(s)", .0.len())]
    ValidationFailed(MessageBag),

    /// Unknown validation rule in a rule string
    #[error("Invalid rule \"{rule}\"")]
    InvalidRule {
        /// The rule as written
        rule: String,
    },

    /// Submitted CSRF token missing or stale
    #[error("CSRF token mismatch")]
    CsrfTokenMismatch,

    /// View file does not exist
    #[error("View not found: {view}")]
    ViewNotFound {
        /// Dotted view name
        view: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Body declared as multipart but not decodable
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },
}

impl Error {
    /// HTTP status used when this error ends a request
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } | Self::InvalidRouteParam { .. } => 404,
            Self::CsrfTokenMismatch => 403,
            Self::ConnectionFailed { .. } => 503,
            Self::PayloadTooLarge { .. } => 413,
            Self::Multipart(_) => 400,
            Self::ValidationFailed(_) => 302,
            _ => 500,
        }
    }
}
