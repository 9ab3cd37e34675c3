//! Gallery table: enrolled vectors as little-endian f32 blobs.

use crate::error::StoreError;
use crate::store::{format_time, SqliteStore};
use chrono::Utc;
use condogate_core::{validate_vector, Category, CoreError, EmbeddingRecord, Gallery, StorageError};
use rusqlite::params;
use std::sync::Arc;

/// View of the gallery table restricted to one vector dimension.
#[derive(Clone)]
pub struct SqliteGallery {
    store: Arc<SqliteStore>,
    dimension: usize,
}

impl SqliteGallery {
    pub fn new(store: Arc<SqliteStore>, dimension: usize) -> Self {
        Self { store, dimension }
    }

    /// Number of enrolled vectors of this dimension.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.store.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM face_embeddings WHERE dimension = ?1",
            [self.dimension as i64],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Embedding ids enrolled for one identity.
    pub fn ids_for(&self, category: Category, reference_id: i64) -> Result<Vec<i64>, StoreError> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(
            "SELECT embedding_id FROM face_embeddings
             WHERE dimension = ?1 AND category = ?2 AND reference_id = ?3
             ORDER BY embedding_id",
        )?;
        let ids = stmt
            .query_map(
                params![self.dimension as i64, category.as_str(), reference_id],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

impl Gallery for SqliteGallery {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn insert(&self, category: Category, reference_id: i64, vector: &[f32]) -> Result<i64, CoreError> {
        validate_vector(vector, self.dimension)?;
        if category == Category::Unknown {
            return Err(CoreError::InvalidInput("cannot enroll category 'unknown'".into()));
        }

        let conn = self.store.conn().map_err(StorageError::from)?;
        conn.execute(
            "INSERT INTO face_embeddings (category, reference_id, dimension, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category.as_str(),
                reference_id,
                self.dimension as i64,
                embedding_to_bytes(vector),
                format_time(Utc::now()),
            ],
        )
        .map_err(|e| StorageError::from(StoreError::from(e)))?;
        Ok(conn.last_insert_rowid())
    }

    fn scan_page(
        &self,
        filter: Option<Category>,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>, StorageError> {
        let conn = self.store.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT embedding_id, category, reference_id, vector FROM face_embeddings
                 WHERE dimension = ?1
                   AND (?2 IS NULL OR category = ?2)
                   AND embedding_id > ?3
                 ORDER BY embedding_id
                 LIMIT ?4",
            )
            .map_err(StoreError::from)?;

        let rows = stmt
            .query_map(
                params![
                    self.dimension as i64,
                    filter.map(Category::as_str),
                    after_id.unwrap_or(i64::MIN),
                    limit as i64,
                ],
                |row| {
                    let category: String = row.get(1)?;
                    let blob: Vec<u8> = row.get(3)?;
                    Ok(EmbeddingRecord {
                        embedding_id: row.get(0)?,
                        category: Category::normalize(&category),
                        reference_id: row.get(2)?,
                        vector: bytes_to_embedding(&blob),
                    })
                },
            )
            .map_err(StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(rows)
    }
}

pub fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a blob; a trailing partial float is dropped and shows up as a
/// dimension mismatch for the matcher to skip.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    if bytes.len() % 4 != 0 {
        tracing::warn!(len = bytes.len(), "embedding blob length is not a multiple of 4");
    }
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery(dim: usize) -> SqliteGallery {
        SqliteGallery::new(Arc::new(SqliteStore::open_in_memory().unwrap()), dim)
    }

    #[test]
    fn test_blob_encoding() {
        let bytes = embedding_to_bytes(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes_to_embedding(&bytes), vec![1.0, -0.5]);
        assert_eq!(bytes_to_embedding(&bytes[..7]), vec![1.0]);
    }

    #[test]
    fn test_insert_and_scan() {
        let g = gallery(3);
        let a = g.insert(Category::Resident, 10, &[1.0, 0.0, 0.0]).unwrap();
        let b = g.insert(Category::Visitor, 11, &[0.0, 1.0, 0.0]).unwrap();
        assert!(b > a);

        let all: Vec<_> = g.scan(None, 1).map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].embedding_id, a);
        assert_eq!(all[0].category, Category::Resident);
        assert_eq!(all[0].reference_id, 10);
        assert_eq!(all[0].vector, vec![1.0, 0.0, 0.0]);

        let visitors: Vec<_> = g.scan(Some(Category::Visitor), 8).map(|r| r.unwrap()).collect();
        assert_eq!(visitors.len(), 1);
        assert_eq!(visitors[0].embedding_id, b);
    }

    #[test]
    fn test_insert_validation() {
        let g = gallery(3);
        assert!(matches!(
            g.insert(Category::Resident, 1, &[1.0, 0.0]),
            Err(CoreError::InvalidDimension { expected: 3, got: 2 })
        ));
        assert!(matches!(
            g.insert(Category::Resident, 1, &[1.0, f32::INFINITY, 0.0]),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(matches!(
            g.insert(Category::Unknown, 1, &[1.0, 0.0, 0.0]),
            Err(CoreError::InvalidInput(_))
        ));
        assert_eq!(g.count().unwrap(), 0);
    }

    #[test]
    fn test_dimensions_are_isolated() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let faces = SqliteGallery::new(store.clone(), 4);
        let attendance = SqliteGallery::new(store, 2);
        faces.insert(Category::Resident, 1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        attendance.insert(Category::InternalStaff, 2, &[1.0, 0.0]).unwrap();
        attendance.insert(Category::InternalStaff, 3, &[0.0, 1.0]).unwrap();

        assert_eq!(faces.count().unwrap(), 1);
        assert_eq!(attendance.count().unwrap(), 2);
        assert!(faces.scan(None, 8).all(|r| r.unwrap().vector.len() == 4));
        assert_eq!(attendance.ids_for(Category::InternalStaff, 3).unwrap().len(), 1);
    }
}
