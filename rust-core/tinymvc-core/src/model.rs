//! # Models
//!
//! A model binds a Rust type to a table and its primary key. Derive it:
//!
//! ```ignore
//! #[derive(Model, Deserialize)]
//! #[model(table = "users")]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! let user: Option<User> = User::query(&db)?.find(1).await?.map(|r| from_record(&r)).transpose()?;
//! ```

use crate::database::DatabasePool;
use crate::error::Result;
use crate::query::{QueryBuilder, DEFAULT_PRIMARY_KEY};

pub use tinymvc_macros::Model;

/// A type stored in one table
pub trait Model {
    /// Table name
    const TABLE: &'static str;

    /// Primary key column
    const PRIMARY_KEY: &'static str = DEFAULT_PRIMARY_KEY;

    /// A fresh builder scoped to this model's table and key
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` if the table or key is malformed.
    fn query(db: &DatabasePool) -> Result<QueryBuilder<'_>> {
        QueryBuilder::table(db, Self::TABLE)?.with_primary_key(Self::PRIMARY_KEY)
    }
}
