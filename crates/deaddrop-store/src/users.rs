//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use rusqlite::params;

use deaddrop_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::User;

impl Database {
    /// Insert a user, or update the handle and last-seen timestamp if the id
    /// already exists.
    ///
    /// Fails with [`StoreError::DuplicateHandle`] when a *different* user
    /// already owns the handle.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, handle, created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     handle = excluded.handle,
                     last_seen_at = excluded.last_seen_at",
                params![
                    user.id.as_str(),
                    user.handle,
                    user.created_at.to_rfc3339(),
                    user.last_seen_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| map_handle_conflict(e, &user.handle))?;
        Ok(())
    }

    /// Fetch a user by handle, if registered.
    pub fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, handle, created_at, last_seen_at
             FROM users WHERE handle = ?1",
        )?;

        let mut rows = stmt.query_map(params![handle], row_to_user)?;
        rows.next().transpose().map_err(StoreError::Sqlite)
    }

    /// Fetch a user by id.
    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, handle, created_at, last_seen_at
                 FROM users WHERE id = ?1",
                params![id.as_str()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all registered users, ordered by handle.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, handle, created_at, last_seen_at
             FROM users ORDER BY handle ASC",
        )?;

        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Record a successful session start for the owning client.
    pub fn mark_seen(&self, id: &UserId, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET last_seen_at = ?2 WHERE id = ?1",
            params![id.as_str(), at.to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn map_handle_conflict(e: rusqlite::Error, handle: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, Some(msg))
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("users.handle") =>
        {
            StoreError::DuplicateHandle(handle.to_string())
        }
        _ => StoreError::Sqlite(e),
    }
}

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let handle: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let last_seen_str: Option<String> = row.get(3)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let last_seen_at = last_seen_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(User {
        id: UserId::new(id),
        handle,
        created_at,
        last_seen_at,
    })
}
