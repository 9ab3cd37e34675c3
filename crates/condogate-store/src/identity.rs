//! Identity directory: one table per category, plus the temporary staff work window.

use crate::error::StoreError;
use crate::store::SqliteStore;
use chrono::NaiveDate;
use condogate_core::{fallback_label, within_window, Category, IdentityResolver, StorageError, ValidityOracle};
use rusqlite::{params, OptionalExtension};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Table and primary key column backing a category.
fn identity_table(category: Category) -> Option<(&'static str, &'static str)> {
    match category {
        Category::Resident => Some(("residents", "resident_id")),
        Category::Visitor => Some(("visitors", "visitor_id")),
        Category::SecurityOfficer => Some(("security_officers", "officer_id")),
        Category::InternalStaff => Some(("internal_staff", "staff_id")),
        Category::TempStaff => Some(("temp_staff", "temp_id")),
        Category::Admin => Some(("admins", "admin_id")),
        Category::Unknown => None,
    }
}

fn require_table(category: Category) -> Result<(&'static str, &'static str), StoreError> {
    identity_table(category).ok_or(StoreError::NoIdentityTable(category))
}

impl SqliteStore {
    /// Create an identity and return its reference id.
    pub fn add_identity(&self, category: Category, full_name: &str) -> Result<i64, StoreError> {
        let (table, _) = require_table(category)?;
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO {table} (full_name) VALUES (?1)"),
            [full_name],
        )?;
        let id = conn.last_insert_rowid();
        tracing::info!(%category, reference_id = id, "identity added");
        Ok(id)
    }

    /// Set the inclusive work window of a temporary staff member. `None` clears a bound.
    pub fn set_work_window(
        &self,
        temp_id: i64,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE temp_staff SET work_start_date = ?2, work_end_date = ?3 WHERE temp_id = ?1",
            params![
                temp_id,
                start.map(|d| d.format(DATE_FORMAT).to_string()),
                end.map(|d| d.format(DATE_FORMAT).to_string()),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn identity_name(&self, category: Category, reference_id: i64) -> Result<Option<String>, StoreError> {
        let Some((table, id_col)) = identity_table(category) else {
            return Ok(None);
        };
        let conn = self.conn()?;
        let name = conn
            .query_row(
                &format!("SELECT full_name FROM {table} WHERE {id_col} = ?1"),
                [reference_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Raw work window bounds. Returns `None` when the row does not exist.
    fn work_window(&self, temp_id: i64) -> Result<Option<(Option<String>, Option<String>)>, StoreError> {
        let conn = self.conn()?;
        let window = conn
            .query_row(
                "SELECT work_start_date, work_end_date FROM temp_staff WHERE temp_id = ?1",
                [temp_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(window)
    }

    /// Remove an identity and every gallery vector enrolled for it.
    ///
    /// Access log rows are kept. Returns the number of embeddings removed.
    pub fn delete_identity(&self, category: Category, reference_id: i64) -> Result<usize, StoreError> {
        let (table, id_col) = require_table(category)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM face_embeddings WHERE category = ?1 AND reference_id = ?2",
            params![category.as_str(), reference_id],
        )?;
        tx.execute(
            &format!("DELETE FROM {table} WHERE {id_col} = ?1"),
            [reference_id],
        )?;
        tx.commit()?;
        tracing::info!(%category, reference_id, embeddings = removed, "identity deleted");
        Ok(removed)
    }
}

fn parse_bound(raw: Option<String>, temp_id: i64) -> Option<NaiveDate> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            tracing::warn!(temp_id, value = %raw, error = %e, "unparsable work date ignored");
            None
        }
    }
}

impl IdentityResolver for SqliteStore {
    fn resolve_name(&self, category: Category, reference_id: i64) -> String {
        match self.identity_name(category, reference_id) {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => fallback_label(category, reference_id),
            Err(e) => {
                tracing::warn!(%category, reference_id, error = %e, "name lookup failed");
                fallback_label(category, reference_id)
            }
        }
    }
}

impl ValidityOracle for SqliteStore {
    fn is_valid(&self, reference_id: i64, as_of: NaiveDate) -> Result<bool, StorageError> {
        let Some((start, end)) = self.work_window(reference_id)? else {
            return Ok(true);
        };
        Ok(within_window(
            parse_bound(start, reference_id),
            parse_bound(end, reference_id),
            as_of,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condogate_core::Gallery;
    use crate::gallery::SqliteGallery;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_add_and_resolve() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.add_identity(Category::Resident, "Mei Tan").unwrap();
        assert_eq!(store.resolve_name(Category::Resident, id), "Mei Tan");
        assert_eq!(store.resolve_name(Category::Visitor, id), format!("visitor:{id}"));
        assert_eq!(store.resolve_name(Category::Unknown, 1), "unknown:1");
        assert!(matches!(
            store.add_identity(Category::Unknown, "x"),
            Err(StoreError::NoIdentityTable(Category::Unknown))
        ));
    }

    #[test]
    fn test_validity_window() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.add_identity(Category::TempStaff, "Raj Kumar").unwrap();

        // no bounds at all
        assert!(store.is_valid(id, date(2026, 3, 10)).unwrap());

        store
            .set_work_window(id, Some(date(2026, 3, 1)), Some(date(2026, 3, 10)))
            .unwrap();
        assert!(store.is_valid(id, date(2026, 3, 1)).unwrap());
        assert!(store.is_valid(id, date(2026, 3, 10)).unwrap());
        assert!(!store.is_valid(id, date(2026, 3, 11)).unwrap());
        assert!(!store.is_valid(id, date(2026, 2, 28)).unwrap());

        store.set_work_window(id, None, Some(date(2026, 3, 10))).unwrap();
        assert!(store.is_valid(id, date(2020, 1, 1)).unwrap());

        // missing row
        assert!(store.is_valid(9999, date(2026, 3, 10)).unwrap());
        assert!(!store.set_work_window(9999, None, None).unwrap());
    }

    #[test]
    fn test_garbage_date_is_ignored() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store.add_identity(Category::TempStaff, "Raj Kumar").unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE temp_staff SET work_end_date = 'soon' WHERE temp_id = ?1",
                [id],
            )
            .unwrap();
        assert!(store.is_valid(id, date(2026, 3, 10)).unwrap());
    }

    #[test]
    fn test_delete_identity_cascades_embeddings() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let gallery = SqliteGallery::new(store.clone(), 2);
        let id = store.add_identity(Category::Visitor, "Guest").unwrap();
        gallery.insert(Category::Visitor, id, &[1.0, 0.0]).unwrap();
        gallery.insert(Category::Visitor, id, &[0.0, 1.0]).unwrap();
        gallery.insert(Category::Resident, id, &[1.0, 1.0]).unwrap();

        assert_eq!(store.delete_identity(Category::Visitor, id).unwrap(), 2);
        assert_eq!(store.identity_name(Category::Visitor, id).unwrap(), None);
        assert_eq!(gallery.count().unwrap(), 1);
    }
}
