//! # Validation Module
//!
//! Rule-string validation of request input, with failures collected per
//! field in a [`MessageBag`].
//!
//! ```ignore
//! ctx.validate(&[
//!     ("name", "required|string|min:3"),
//!     ("email", "required|email|unique:users,email"),
//!     ("avatar", "optional|image"),
//! ])
//! .await?;
//! ```
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only decides whether input satisfies rules
//! - **O**: New rules are new `Rule` variants
//! - **D**: Reads input through `Request`, persists through `Session`

use crate::context::Context;
use crate::database::DatabasePool;
use crate::error::{Error, Result};
use crate::query::{Operator, QueryBuilder, DEFAULT_PRIMARY_KEY};
use crate::request::Request;
use crate::session::Session;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Session key validation errors are stored under
pub const ERRORS_KEY: &str = "errors";

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is valid")
});

/// Validation messages grouped by field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageBag {
    messages: BTreeMap<String, Vec<String>>,
}

impl MessageBag {
    /// Create an empty bag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message for `field`
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Whether `field` has any message
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.messages.contains_key(field)
    }

    /// First message for `field`
    #[must_use]
    pub fn first(&self, field: &str) -> Option<&str> {
        self.messages
            .get(field)
            .and_then(|m| m.first())
            .map(String::as_str)
    }

    /// Every message for `field`
    #[must_use]
    pub fn get(&self, field: &str) -> &[String] {
        self.messages.get(field).map_or(&[], Vec::as_slice)
    }

    /// All messages, by field
    #[must_use]
    pub fn all(&self) -> &BTreeMap<String, Vec<String>> {
        &self.messages
    }

    /// Whether the bag holds no message
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of fields with messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Persist to the session for the next request
    pub fn store(&self, session: &Session) {
        match serde_json::to_value(self) {
            Ok(value) => session.set(ERRORS_KEY, value),
            Err(e) => debug!(error = %e, "Could not store validation errors"),
        }
    }

    /// Remove stored messages from the session
    pub fn destroy(session: &Session) {
        session.unset(ERRORS_KEY);
    }

    /// Messages stored by a previous request, empty if none
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        session.get_as(ERRORS_KEY).unwrap_or_default()
    }
}

/// A single validation rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Field must be present (input or file)
    Required,
    /// Skip the field's remaining rules when it is absent
    Optional,
    /// Valid email address
    Email,
    /// Present as text
    String,
    /// Parses as an integer
    Integer,
    /// Parses as a number
    Numeric,
    /// ASCII letters and digits only
    AlphaNumeric,
    /// Non-empty uploaded file
    File,
    /// Uploaded file whose content is an image
    Image,
    /// At least `n` characters
    Min(usize),
    /// At most `n` characters
    Max(usize),
    /// No row of `table` has this value in `column`
    Unique {
        /// Table to search
        table: String,
        /// Column to compare
        column: String,
        /// Primary key value of a row to ignore (updates)
        ignore: Option<String>,
        /// Primary key column (default `id`)
        primary_key: String,
    },
    /// Uploaded file content is one of these types
    Mime(Vec<String>),
}

impl FromStr for Rule {
    type Err = Error;

    fn from_str(rule: &str) -> Result<Self> {
        let invalid = || Error::InvalidRule {
            rule: rule.to_string(),
        };

        let Some((name, param)) = rule.split_once(':') else {
            return match rule {
                "required" => Ok(Self::Required),
                "optional" => Ok(Self::Optional),
                "email" => Ok(Self::Email),
                "string" => Ok(Self::String),
                "integer" => Ok(Self::Integer),
                "numeric" => Ok(Self::Numeric),
                "alpha_numeric" => Ok(Self::AlphaNumeric),
                "file" => Ok(Self::File),
                "image" => Ok(Self::Image),
                _ => Err(invalid()),
            };
        };

        match name {
            "min" => param.trim().parse().map(Self::Min).map_err(|_| invalid()),
            "max" => param.trim().parse().map(Self::Max).map_err(|_| invalid()),
            "unique" => {
                let parts: Vec<&str> = param.split(',').map(str::trim).collect();
                match parts.as_slice() {
                    [table, column, rest @ ..] if rest.len() <= 2 => Ok(Self::Unique {
                        table: (*table).to_string(),
                        column: (*column).to_string(),
                        ignore: rest.first().filter(|s| !s.is_empty()).map(|s| (*s).to_string()),
                        primary_key: rest.get(1).map_or(DEFAULT_PRIMARY_KEY, |s| *s).to_string(),
                    }),
                    _ => Err(invalid()),
                }
            }
            "mime" => {
                let types: Vec<String> = param
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                if types.is_empty() {
                    Err(invalid())
                } else {
                    Ok(Self::Mime(types))
                }
            }
            _ => Err(invalid()),
        }
    }
}

impl Rule {
    /// Parse a `|`-separated rule string
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRule` for the first unknown rule.
    pub fn parse(rules: &str) -> Result<Vec<Self>> {
        rules
            .split('|')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse)
            .collect()
    }
}

/// Result of checking file content against allowed types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeCheck {
    /// Detected type is allowed
    Allowed(&'static str),
    /// Detected type is not in the list
    Rejected(&'static str),
    /// Content type could not be detected
    Unknown,
}

/// Detect a content type from magic bytes
#[must_use]
pub fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
    ];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return Some(*mime);
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    let is_text = !bytes.is_empty()
        && std::str::from_utf8(bytes)
            .is_ok_and(|s| s.chars().all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t')));
    is_text.then_some("text/plain")
}

/// Check file content against an allow-list
///
/// Entries may be full types (`image/png`) or short names (`png`, `jpg`,
/// `pdf`, `txt`).
#[must_use]
pub fn check_mime(bytes: &[u8], allowed: &[impl AsRef<str>]) -> MimeCheck {
    let Some(detected) = detect_mime(bytes) else {
        return MimeCheck::Unknown;
    };

    let subtype = detected.split_once('/').map_or(detected, |(_, sub)| sub);
    let permitted = allowed.iter().any(|entry| {
        let entry = entry.as_ref().trim().to_ascii_lowercase();
        entry == detected
            || entry == subtype
            || (entry == "jpg" && subtype == "jpeg")
            || (entry == "txt" && detected == "text/plain")
    });

    if permitted {
        MimeCheck::Allowed(detected)
    } else {
        MimeCheck::Rejected(detected)
    }
}

/// `first_name` -> `First Name`
fn display_name(field: &str) -> String {
    field
        .replace(['-', '_'], " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs rule strings against a request
pub struct Validator<'a> {
    request: &'a Request,
    db: Option<&'a DatabasePool>,
    bag: MessageBag,
}

impl<'a> Validator<'a> {
    /// Validator over `request`; `db` backs the `unique` rule
    #[must_use]
    pub fn new(request: &'a Request, db: Option<&'a DatabasePool>) -> Self {
        Self {
            request,
            db,
            bag: MessageBag::new(),
        }
    }

    /// Validate the current request, persisting failures to the session
    ///
    /// On failure the messages and the submitted input are stored on the
    /// session and `Error::ValidationFailed` is returned; the server turns
    /// it into a redirect back. On success stale messages are cleared.
    ///
    /// # Errors
    ///
    /// `Error::ValidationFailed` when a rule fails, `Error::InvalidRule`
    /// for a malformed rule string, and database errors from `unique`.
    pub async fn validate(ctx: &Context, rules: &[(&str, &str)]) -> Result<()> {
        let db = ctx.app().database();
        let bag = Validator::new(ctx.request(), db).check(rules).await?;
        let session = ctx.session();

        if bag.is_empty() {
            MessageBag::destroy(session);
            return Ok(());
        }

        debug!(fields = bag.len(), path = %ctx.request().path, "Validation failed");
        bag.store(session);
        session.set_old_input(&ctx.request().all_input());
        Err(Error::ValidationFailed(bag))
    }

    /// Run every field's rules and return the collected messages
    ///
    /// # Errors
    ///
    /// `Error::InvalidRule` for a malformed rule string and database
    /// errors from `unique`.
    pub async fn check(mut self, rules: &[(&str, &str)]) -> Result<MessageBag> {
        for (field, rule_string) in rules {
            for rule in Rule::parse(rule_string)? {
                if rule == Rule::Optional {
                    if self.is_absent(field) {
                        break;
                    }
                    continue;
                }
                self.apply(field, &rule).await?;
            }
        }
        Ok(self.bag)
    }

    fn value(&self, field: &str) -> Option<&'a str> {
        self.request.input(field)
    }

    fn is_absent(&self, field: &str) -> bool {
        self.value(field).map_or(true, str::is_empty) && !self.request.has_file(field)
    }

    fn error(&mut self, field: &str, message: &str) {
        self.bag.add(field, format!("{} {message}", display_name(field)));
    }

    async fn apply(&mut self, field: &str, rule: &Rule) -> Result<()> {
        let value = self.value(field);

        match rule {
            Rule::Optional => {}
            Rule::Required => {
                if self.is_absent(field) {
                    self.error(field, "is required!");
                }
            }
            Rule::String => {
                if value.is_none() {
                    self.error(field, "should be a string!");
                }
            }
            Rule::Integer => {
                if value.and_then(|v| v.trim().parse::<i64>().ok()).is_none() {
                    self.error(field, "should be an integer!");
                }
            }
            Rule::Numeric => {
                if !value
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .is_some_and(f64::is_finite)
                {
                    self.error(field, "should be numeric!");
                }
            }
            Rule::Email => {
                if !value.is_some_and(|v| EMAIL_REGEX.is_match(v)) {
                    self.error(field, "should be a valid email!");
                }
            }
            Rule::AlphaNumeric => {
                if !value.is_some_and(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_alphanumeric())) {
                    self.error(field, "should be alpha numerical!");
                }
            }
            Rule::File => {
                if !self.request.has_file(field) {
                    self.error(field, "should be a file!");
                }
            }
            Rule::Image => {
                let is_image = self
                    .request
                    .file(field)
                    .and_then(|f| detect_mime(&f.data))
                    .is_some_and(|mime| mime.starts_with("image/"));
                if !is_image {
                    self.error(field, "should be an image!");
                }
            }
            Rule::Min(min) => {
                if let Some(v) = value {
                    if v.chars().count() < *min {
                        self.error(
                            field,
                            &format!("should contain characters more than or equals to {min}!"),
                        );
                    }
                }
            }
            Rule::Max(max) => {
                if let Some(v) = value {
                    if v.chars().count() > *max {
                        self.error(
                            field,
                            &format!("should contain characters less than or equals to {max}!"),
                        );
                    }
                }
            }
            Rule::Mime(types) => {
                let verdict = self
                    .request
                    .file(field)
                    .map_or(MimeCheck::Unknown, |f| check_mime(&f.data, types.as_slice()));
                if !matches!(verdict, MimeCheck::Allowed(_)) {
                    self.error(field, &format!("should be of type {}!", types.join(", ")));
                }
            }
            Rule::Unique {
                table,
                column,
                ignore,
                primary_key,
            } => {
                if self.exists(table, column, ignore.as_deref(), primary_key, value).await? {
                    self.error(field, "already exists!");
                }
            }
        }

        Ok(())
    }

    async fn exists(
        &self,
        table: &str,
        column: &str,
        ignore: Option<&str>,
        primary_key: &str,
        value: Option<&str>,
    ) -> Result<bool> {
        let Some(value) = value else {
            return Ok(false);
        };
        let db = self.db.ok_or_else(|| Error::ConnectionFailed {
            message: "unique rule needs a database".to_string(),
        })?;

        let mut query = QueryBuilder::table(db, table)?
            .select_columns(&[])?
            .where_(column, Operator::Eq.as_str(), value)?;
        if let Some(id) = ignore {
            query = query.where_and(primary_key, Operator::NotEq.as_str(), id)?;
        }

        Ok(query.first().await?.is_some())
    }
}
