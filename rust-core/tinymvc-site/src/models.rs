//! Database-backed models

use serde::{Deserialize, Serialize};
use tinymvc_core::Model;

/// A registered user
#[derive(Model, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[model(table = "users", primary_key = "id")]
pub struct User {
    /// Primary key
    pub id: i64,
    /// Display name
    pub name: String,
    /// Unique contact address
    pub email: String,
}
