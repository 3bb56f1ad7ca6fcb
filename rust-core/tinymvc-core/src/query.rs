//! # Query Builder
//!
//! Fluent composition of one parameterized SQL statement.
//!
//! Values always travel as named bound parameters (`:column`). Table and
//! column names are interpolated into the SQL text, so they are checked
//! against a plain-identifier grammar and must come from code, never from
//! request input.
//!
//! ## Example
//!
//! ```ignore
//! let adults = QueryBuilder::table(&db, "users")?
//!     .select_columns(&["id", "name"])?
//!     .where_("age", ">=", 18)?
//!     .where_or("role", "=", "admin")?
//!     .get()
//!     .await?;
//! ```
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only composes and runs statements, connection handling lives in `database`
//! - **O**: New clause kinds are new chain methods over the same accumulator
//! - **L**: Every chain method returns the same owned builder

use crate::database::{from_record, BoundParams, DatabasePool, DbValue, Record};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// Primary key column used when none is given
pub const DEFAULT_PRIMARY_KEY: &str = "id";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("identifier pattern is valid")
});

/// Comparison operators accepted in WHERE clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `LIKE`
    Like,
    /// `<>`
    NotEq,
}

impl Operator {
    /// SQL spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::NotEq => "<>",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "=" => Ok(Self::Eq),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Gte),
            "<=" => Ok(Self::Lte),
            "<>" => Ok(Self::NotEq),
            op if op.eq_ignore_ascii_case("like") => Ok(Self::Like),
            other => Err(Error::InvalidOperator {
                operator: other.to_string(),
            }),
        }
    }
}

/// Check a table or column name
///
/// # Errors
///
/// Returns `Error::InvalidIdentifier` unless `name` is a plain identifier,
/// optionally qualified once (`users.id`).
pub fn check_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(Error::InvalidIdentifier {
            identifier: name.to_string(),
        })
    }
}

/// Builder for a single SQL statement against one table
///
/// Chain methods take the builder by value and hand it back; the
/// executing methods consume it, so a builder runs at most once.
#[derive(Debug)]
#[must_use]
pub struct QueryBuilder<'db> {
    db: &'db DatabasePool,
    table: String,
    primary_key: String,
    fragments: Vec<String>,
    params: BoundParams,
    has_where: bool,
    between_count: usize,
}

impl<'db> QueryBuilder<'db> {
    /// Start a statement on `table`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a malformed table name.
    pub fn table(db: &'db DatabasePool, table: &str) -> Result<Self> {
        check_identifier(table)?;
        Ok(Self {
            db,
            table: table.to_string(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            fragments: Vec::new(),
            params: BoundParams::new(),
            has_where: false,
            between_count: 0,
        })
    }

    /// Override the primary key column (default `id`)
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a malformed column name.
    pub fn with_primary_key(mut self, column: &str) -> Result<Self> {
        check_identifier(column)?;
        self.primary_key = column.to_string();
        Ok(self)
    }

    /// Target table
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Primary key column
    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// The statement composed so far
    #[must_use]
    pub fn sql(&self) -> String {
        self.fragments.join(" ")
    }

    /// Parameters bound so far
    #[must_use]
    pub fn bindings(&self) -> &BoundParams {
        &self.params
    }

    /// `SELECT <columns> FROM <table>`; an empty list selects `*`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a malformed column name.
    pub fn select_columns(mut self, columns: &[&str]) -> Result<Self> {
        let list = if columns.is_empty() || columns == ["*"] {
            "*".to_string()
        } else {
            for column in columns {
                check_identifier(column)?;
            }
            columns.join(", ")
        };
        self.fragments
            .push(format!("SELECT {list} FROM {}", self.table));
        Ok(self)
    }

    /// `WHERE col op :col`, or `AND ...` when a clause already exists
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOperator` for an operator outside
    /// `= > < >= <= LIKE <>`, `Error::InvalidIdentifier` for a bad column.
    pub fn where_(self, column: &str, op: &str, value: impl Into<DbValue>) -> Result<Self> {
        let connector = if self.has_where { "AND" } else { "WHERE" };
        self.push_condition(connector, column, op, value.into())
    }

    /// `AND col op :col`
    ///
    /// # Errors
    ///
    /// As [`QueryBuilder::where_`].
    pub fn where_and(self, column: &str, op: &str, value: impl Into<DbValue>) -> Result<Self> {
        let connector = if self.has_where { "AND" } else { "WHERE" };
        self.push_condition(connector, column, op, value.into())
    }

    /// `OR col op :col`
    ///
    /// # Errors
    ///
    /// As [`QueryBuilder::where_`].
    pub fn where_or(self, column: &str, op: &str, value: impl Into<DbValue>) -> Result<Self> {
        let connector = if self.has_where { "OR" } else { "WHERE" };
        self.push_condition(connector, column, op, value.into())
    }

    /// `WHERE col LIKE :col`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a bad column.
    pub fn where_like(self, column: &str, pattern: impl Into<DbValue>) -> Result<Self> {
        self.where_(column, Operator::Like.as_str(), pattern)
    }

    /// `WHERE col BETWEEN :valN AND :valM`
    ///
    /// Chained after an existing clause the connector is `AND`. The first
    /// range binds `val1`/`val2`, the next `val3`/`val4`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a bad column.
    pub fn where_between(
        mut self,
        column: &str,
        low: impl Into<DbValue>,
        high: impl Into<DbValue>,
    ) -> Result<Self> {
        check_identifier(column)?;
        let connector = if self.has_where { "AND" } else { "WHERE" };

        let low_name = self.allocate(&format!("val{}", self.between_count + 1));
        self.params.set(low_name.clone(), low);
        let high_name = self.allocate(&format!("val{}", self.between_count + 2));
        self.params.set(high_name.clone(), high);
        self.between_count += 2;

        self.fragments.push(format!(
            "{connector} {column} BETWEEN :{low_name} AND :{high_name}"
        ));
        self.has_where = true;
        Ok(self)
    }

    fn push_condition(
        mut self,
        connector: &str,
        column: &str,
        op: &str,
        value: DbValue,
    ) -> Result<Self> {
        let op: Operator = op.parse()?;
        check_identifier(column)?;

        let name = self.allocate(&column.replace('.', "_"));
        self.fragments
            .push(format!("{connector} {column} {op} :{name}"));
        self.params.set(name, value);
        self.has_where = true;
        Ok(self)
    }

    /// Pick a placeholder name not yet bound: `age`, then `age_2`, ...
    fn allocate(&self, base: &str) -> String {
        if !self.params.contains(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.params.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    fn ensure_select(&mut self) {
        let has_head = self
            .fragments
            .first()
            .is_some_and(|f| f.starts_with("SELECT"));
        if !has_head {
            self.fragments
                .insert(0, format!("SELECT * FROM {}", self.table));
        }
    }

    /// Run the SELECT and return every row
    ///
    /// Without an explicit [`select_columns`](Self::select_columns) the
    /// statement selects `*`.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryExecutionFailed` when the database rejects the statement.
    pub async fn get(mut self) -> Result<Vec<Record>> {
        self.ensure_select();
        let sql = self.sql();
        self.db.prepare(&sql).fetch_all(&self.params).await
    }

    /// Run the SELECT with `LIMIT 1`; no row is `Ok(None)`
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryExecutionFailed` when the database rejects the statement.
    pub async fn first(mut self) -> Result<Option<Record>> {
        self.ensure_select();
        self.fragments.push("LIMIT 1".to_string());
        let sql = self.sql();
        self.db.prepare(&sql).fetch_optional(&self.params).await
    }

    /// [`get`](Self::get), deserializing each row into `T`
    ///
    /// # Errors
    ///
    /// As `get`, plus `Error::Json` when a row doesn't fit `T`.
    pub async fn get_as<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.get().await?.iter().map(from_record).collect()
    }

    /// [`first`](Self::first), deserializing the row into `T`
    ///
    /// # Errors
    ///
    /// As `first`, plus `Error::Json` when the row doesn't fit `T`.
    pub async fn first_as<T: DeserializeOwned>(self) -> Result<Option<T>> {
        self.first().await?.as_ref().map(from_record).transpose()
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<:cols>)`
    ///
    /// Returns whether a row was written.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` for a bad column name and
    /// `Error::QueryExecutionFailed` when the insert is rejected.
    pub async fn create(mut self, values: BoundParams) -> Result<bool> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let mut columns = Vec::with_capacity(values.len());
            let mut placeholders = Vec::with_capacity(values.len());
            for (column, _) in values.iter() {
                check_identifier(column)?;
                columns.push(column.to_string());
                placeholders.push(format!(":{column}"));
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        self.fragments = vec![sql];
        self.params = values;
        self.write().await
    }

    /// `UPDATE <table> SET col = :col, ... WHERE <pk> = :<pk>`
    ///
    /// Only the given columns change. Returns whether a row was touched.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyUpdate` when `values` is empty,
    /// `Error::InvalidIdentifier` for a bad column name and
    /// `Error::QueryExecutionFailed` when the update is rejected.
    pub async fn update(mut self, values: BoundParams, pk: impl Into<DbValue>) -> Result<bool> {
        if values.is_empty() {
            return Err(Error::EmptyUpdate {
                table: self.table.clone(),
            });
        }
        let mut assignments = Vec::with_capacity(values.len());
        for (column, _) in values.iter() {
            check_identifier(column)?;
            assignments.push(format!("{column} = :{column}"));
        }

        self.params = values;
        let pk_name = self.allocate(&self.primary_key.replace('.', "_"));
        self.fragments = vec![format!(
            "UPDATE {} SET {} WHERE {} = :{pk_name}",
            self.table,
            assignments.join(", "),
            self.primary_key
        )];
        self.params.set(pk_name, pk);
        self.write().await
    }

    /// `DELETE FROM <table> WHERE <pk> = :<pk>`
    ///
    /// Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryExecutionFailed` when the delete is rejected.
    pub async fn delete(mut self, pk: impl Into<DbValue>) -> Result<bool> {
        let pk_name = self.primary_key.replace('.', "_");
        self.fragments = vec![format!(
            "DELETE FROM {} WHERE {} = :{pk_name}",
            self.table, self.primary_key
        )];
        self.params = BoundParams::new();
        self.params.set(pk_name, pk);
        self.write().await
    }

    /// `SELECT * ... WHERE <pk> = :<pk> LIMIT 1`
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryExecutionFailed` when the select is rejected.
    pub async fn find(self, pk: impl Into<DbValue>) -> Result<Option<Record>> {
        let pk_column = self.primary_key.clone();
        self.select_columns(&[])?
            .where_(&pk_column, Operator::Eq.as_str(), pk)?
            .first()
            .await
    }

    /// `SELECT * FROM <table>`
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryExecutionFailed` when the select is rejected.
    pub async fn all(self) -> Result<Vec<Record>> {
        self.select_columns(&[])?.get().await
    }

    async fn write(self) -> Result<bool> {
        let sql = self.sql();
        let affected = self.db.prepare(&sql).execute(&self.params).await?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    async fn users_db() -> DatabasePool {
        let db = DatabasePool::connect_sqlite("sqlite::memory:", Some(1))
            .await
            .unwrap();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT, age INTEGER)")
            .await
            .unwrap();
        db
    }

    /// Pool that never connects; the pool reaper needs a running runtime
    fn lazy_db() -> DatabasePool {
        DatabasePool::connect_lazy("sqlite::memory:", Some(1)).unwrap()
    }

    fn user(id: i64, name: &str, age: i64) -> BoundParams {
        let mut params = BoundParams::new();
        params.set("id", id);
        params.set("name", name);
        params.set("email", format!("{name}@example.com"));
        params.set("age", age);
        params
    }

    #[test]
    fn test_operator_parse() {
        for op in ["=", ">", "<", ">=", "<=", "LIKE", "<>"] {
            let parsed: Operator = op.parse().unwrap();
            assert_eq!(parsed.as_str(), op);
        }
        assert_eq!("like".parse::<Operator>().unwrap(), Operator::Like);
    }

    #[tokio::test]
    async fn test_invalid_operator() {
        let db = lazy_db();
        for op in ["!=", "==", "IN", "; DROP", ""] {
            let err = QueryBuilder::table(&db, "users")
                .unwrap()
                .where_("id", op, 1)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidOperator { .. }), "{op}");
        }
    }

    #[tokio::test]
    async fn test_invalid_identifier() {
        let db = lazy_db();
        assert!(QueryBuilder::table(&db, "users; DROP TABLE users").is_err());
        assert!(QueryBuilder::table(&db, "1users").is_err());

        let err = QueryBuilder::table(&db, "users")
            .unwrap()
            .where_("name = 1 OR 1", "=", 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { .. }));

        assert!(check_identifier("users.id").is_ok());
        assert!(check_identifier("a.b.c").is_err());
    }

    #[tokio::test]
    async fn test_select_and_where_sql() {
        let db = lazy_db();
        let q = QueryBuilder::table(&db, "users")
            .unwrap()
            .select_columns(&["id", "name"])
            .unwrap()
            .where_("id", "=", 5)
            .unwrap();

        assert_eq!(q.sql(), "SELECT id, name FROM users WHERE id = :id");
        assert_eq!(q.bindings().get("id"), Some(&DbValue::Int(5)));
    }

    #[tokio::test]
    async fn test_where_and_clause_order() {
        let db = lazy_db();
        let q = QueryBuilder::table(&db, "users")
            .unwrap()
            .select_columns(&[])
            .unwrap()
            .where_("name", "=", "a")
            .unwrap()
            .where_and("email", "<>", "b")
            .unwrap();

        assert_eq!(
            q.sql(),
            "SELECT * FROM users WHERE name = :name AND email <> :email"
        );
        assert_eq!(q.bindings().len(), 2);
        assert!(q.bindings().contains("name"));
        assert!(q.bindings().contains("email"));
    }

    #[tokio::test]
    async fn test_second_where_renders_and() {
        let db = lazy_db();
        let q = QueryBuilder::table(&db, "users")
            .unwrap()
            .where_("age", ">", 18)
            .unwrap()
            .where_("age", "<", 65)
            .unwrap()
            .where_or("name", "LIKE", "A%")
            .unwrap();

        assert_eq!(
            q.sql(),
            "WHERE age > :age AND age < :age_2 OR name LIKE :name"
        );
        assert_eq!(q.bindings().get("age_2"), Some(&DbValue::Int(65)));
    }

    #[tokio::test]
    async fn test_where_between_numbering() {
        let db = lazy_db();
        let q = QueryBuilder::table(&db, "users")
            .unwrap()
            .select_columns(&[])
            .unwrap()
            .where_between("age", 18, 30)
            .unwrap()
            .where_between("id", 1, 100)
            .unwrap();

        assert_eq!(
            q.sql(),
            "SELECT * FROM users WHERE age BETWEEN :val1 AND :val2 AND id BETWEEN :val3 AND :val4"
        );
        assert_eq!(q.bindings().get("val4"), Some(&DbValue::Int(100)));
    }

    #[tokio::test]
    async fn test_where_like_and_qualified_column() {
        let db = lazy_db();
        let q = QueryBuilder::table(&db, "users")
            .unwrap()
            .where_like("users.name", "%jo%")
            .unwrap();
        assert_eq!(q.sql(), "WHERE users.name LIKE :users_name");
    }

    #[tokio::test]
    async fn test_find_returns_row() {
        let db = users_db().await;
        assert!(QueryBuilder::table(&db, "users")
            .unwrap()
            .create(user(5, "a", 30))
            .await
            .unwrap());

        let row = QueryBuilder::table(&db, "users")
            .unwrap()
            .find(5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&DbValue::Int(5)));
        assert_eq!(row.get("name"), Some(&DbValue::String("a".into())));
    }

    #[tokio::test]
    async fn test_insert_find_round_trip() {
        let db = users_db().await;
        let inserted = user(1, "alice", 31);
        QueryBuilder::table(&db, "users")
            .unwrap()
            .create(inserted.clone())
            .await
            .unwrap();

        let row = QueryBuilder::table(&db, "users")
            .unwrap()
            .find(1)
            .await
            .unwrap()
            .unwrap();
        for (column, value) in inserted.iter() {
            assert_eq!(row.get(column), Some(value), "{column}");
        }
    }

    #[tokio::test]
    async fn test_update_touches_only_given_columns() {
        let db = users_db().await;
        QueryBuilder::table(&db, "users")
            .unwrap()
            .create(user(1, "alice", 31))
            .await
            .unwrap();

        let mut changes = BoundParams::new();
        changes.set("name", "alicia");
        assert!(QueryBuilder::table(&db, "users")
            .unwrap()
            .update(changes, 1)
            .await
            .unwrap());

        let row = QueryBuilder::table(&db, "users")
            .unwrap()
            .find(1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("name"), Some(&DbValue::String("alicia".into())));
        assert_eq!(row.get("age"), Some(&DbValue::Int(31)));
        assert_eq!(
            row.get("email"),
            Some(&DbValue::String("alice@example.com".into()))
        );
    }

    #[tokio::test]
    async fn test_update_missing_row_is_false() {
        let db = users_db().await;
        let mut changes = BoundParams::new();
        changes.set("name", "ghost");
        assert!(!QueryBuilder::table(&db, "users")
            .unwrap()
            .update(changes, 99)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_without_columns_is_rejected() {
        let db = lazy_db();
        let err = QueryBuilder::table(&db, "users")
            .unwrap()
            .update(BoundParams::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyUpdate { table } if table == "users"));
    }

    #[tokio::test]
    async fn test_delete_then_find_is_none() {
        let db = users_db().await;
        QueryBuilder::table(&db, "users")
            .unwrap()
            .create(user(3, "carol", 40))
            .await
            .unwrap();

        assert!(QueryBuilder::table(&db, "users")
            .unwrap()
            .delete(3)
            .await
            .unwrap());
        assert!(QueryBuilder::table(&db, "users")
            .unwrap()
            .find(3)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_all_and_filtered_get() {
        let db = users_db().await;
        for (id, name, age) in [(1, "a", 17), (2, "b", 25), (3, "c", 40)] {
            QueryBuilder::table(&db, "users")
                .unwrap()
                .create(user(id, name, age))
                .await
                .unwrap();
        }

        let all = QueryBuilder::table(&db, "users").unwrap().all().await.unwrap();
        assert_eq!(all.len(), 3);

        let adults = QueryBuilder::table(&db, "users")
            .unwrap()
            .where_between("age", 18, 30)
            .unwrap()
            .get()
            .await
            .unwrap();
        assert_eq!(adults.len(), 1);
        assert_eq!(adults[0].get("name"), Some(&DbValue::String("b".into())));
    }

    #[tokio::test]
    async fn test_first_as_typed() {
        #[derive(Debug, Deserialize)]
        struct User {
            id: i64,
            name: String,
        }

        let db = users_db().await;
        QueryBuilder::table(&db, "users")
            .unwrap()
            .create(user(9, "zed", 50))
            .await
            .unwrap();

        let found: Option<User> = QueryBuilder::table(&db, "users")
            .unwrap()
            .where_("name", "=", "zed")
            .unwrap()
            .first_as()
            .await
            .unwrap();
        let found = found.unwrap();
        assert_eq!(found.id, 9);
        assert_eq!(found.name, "zed");
    }

    #[tokio::test]
    async fn test_execution_failure_propagates() {
        let db = users_db().await;
        let err = QueryBuilder::table(&db, "missing")
            .unwrap()
            .all()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_custom_primary_key() {
        let db = users_db().await;
        db.execute("CREATE TABLE posts (slug TEXT PRIMARY KEY, title TEXT)")
            .await
            .unwrap();

        let mut post = BoundParams::new();
        post.set("slug", "hello");
        post.set("title", "Hello");
        QueryBuilder::table(&db, "posts")
            .unwrap()
            .create(post)
            .await
            .unwrap();

        let row = QueryBuilder::table(&db, "posts")
            .unwrap()
            .with_primary_key("slug")
            .unwrap()
            .find("hello")
            .await
            .unwrap();
        assert!(row.is_some());
    }
}
