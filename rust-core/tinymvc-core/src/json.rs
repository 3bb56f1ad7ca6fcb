//! # JSON Serialization Module
//!
//! Request bodies are parsed with simd-json, falling back to serde_json
//! when simd-json rejects the input, so parse errors always surface as
//! `Error::Json`.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only handles JSON serialization/deserialization
//! - **D**: Depends on serde abstractions, not concrete parsers

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Parse JSON text into a typed value
///
/// # Errors
///
/// Returns `Error::Json` if the input isn't valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    parse_json_bytes(json_str.as_bytes())
}

/// Parse JSON bytes into a typed value
///
/// simd-json parses in place, so it works on a scratch copy.
///
/// # Errors
///
/// Returns `Error::Json` if the input isn't valid JSON for `T`.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut scratch = bytes.to_vec();
    match simd_json::from_slice(&mut scratch) {
        Ok(value) => Ok(value),
        Err(e) => {
            debug!(error = %e, "simd-json rejected body, retrying with serde_json");
            Ok(serde_json::from_slice(bytes)?)
        }
    }
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if `value` can't be represented as JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
