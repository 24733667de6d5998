//! Category operations
//!
//! Categories are shared by all users and referenced by name from
//! transactions and budgets. Names are unique ignoring case.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::Database;
use crate::error::{Error, Result};
use crate::models::Category;

/// Categories created by `seed_default_categories`
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "dining",
    "transport",
    "shopping",
    "entertainment",
    "housing",
    "medical",
    "education",
    "salary",
    "other",
];

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
    Ok(conn
        .query_row(
            "SELECT id, name FROM categories WHERE name = ? COLLATE NOCASE",
            params![name],
            row_to_category,
        )
        .optional()?)
}

fn clean_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidData("category name is required".into()));
    }
    Ok(name)
}

/// Map a UNIQUE violation from a racing writer to the same conflict the
/// up-front check reports
fn conflict_on_unique(name: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Error::Conflict(format!("Category already exists: {}", name))
        }
        _ => Error::Database(e),
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Category {} not found", id))
}

impl Database {
    /// Insert the default categories that are not present yet
    pub fn seed_default_categories(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut inserted = 0;
        for name in DEFAULT_CATEGORIES {
            inserted += conn.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?)",
                params![name],
            )?;
        }
        if inserted > 0 {
            info!(inserted, "Seeded default categories");
        }
        Ok(inserted)
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;
        let categories = stmt
            .query_map([], row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT id, name FROM categories WHERE id = ?",
                params![id],
                row_to_category,
            )
            .optional()?)
    }

    /// Case-insensitive lookup returning the stored spelling
    pub fn resolve_category(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        find_by_name(&conn, name.trim())
    }

    /// Add a category, rejecting names that already exist in any case
    pub fn add_category(&self, name: &str) -> Result<Category> {
        let name = clean_name(name)?;
        let conn = self.conn()?;

        if let Some(existing) = find_by_name(&conn, name)? {
            return Err(Error::Conflict(format!(
                "Category already exists: {}",
                existing.name
            )));
        }

        conn.execute("INSERT INTO categories (name) VALUES (?)", params![name])
            .map_err(conflict_on_unique(name))?;
        Ok(Category {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Rename a category
    ///
    /// Transactions and budgets keep the old name; categories are a logical
    /// reference only.
    pub fn update_category(&self, id: i64, name: &str) -> Result<Category> {
        let name = clean_name(name)?;
        let conn = self.conn()?;

        if let Some(existing) = find_by_name(&conn, name)? {
            if existing.id != id {
                return Err(Error::Conflict(format!(
                    "Category already exists: {}",
                    existing.name
                )));
            }
        }

        let updated = conn
            .execute(
                "UPDATE categories SET name = ? WHERE id = ?",
                params![name, id],
            )
            .map_err(conflict_on_unique(name))?;
        if updated == 0 {
            return Err(not_found(id));
        }

        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    /// Delete a category; rows that reference it by name are left alone
    pub fn delete_category(&self, id: i64) -> Result<Category> {
        let existing = self.get_category(id)?.ok_or_else(|| not_found(id))?;
        let conn = self.conn()?;
        conn.execute("DELETE FROM categories WHERE id = ?", params![id])?;
        Ok(existing)
    }
}
