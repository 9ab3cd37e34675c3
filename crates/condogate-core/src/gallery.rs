//! Embedding gallery contract and its lazy scan.

use crate::category::Category;
use crate::error::{CoreError, StorageError};
use crate::types::EmbeddingRecord;

/// Append-only store of enrolled vectors, bound to one vector dimension.
///
/// Implementations must be safe for concurrent readers; records are never
/// mutated in place so a reader never observes a torn vector.
pub trait Gallery: Send + Sync {
    /// Dimension every vector of this gallery must have.
    fn dimension(&self) -> usize;

    /// Enroll a vector and return its new `embedding_id`.
    fn insert(
        &self,
        category: Category,
        reference_id: i64,
        vector: &[f32],
    ) -> Result<i64, CoreError>;

    /// Up to `limit` records with `embedding_id > after_id`, ascending by id.
    fn scan_page(
        &self,
        filter: Option<Category>,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EmbeddingRecord>, StorageError>;

    /// Lazy scan over the current gallery contents.
    ///
    /// Each call starts over from the beginning and sees rows inserted since
    /// the previous call. No ordering is promised to callers.
    fn scan(&self, filter: Option<Category>, page_size: usize) -> GalleryScan<'_, Self>
    where
        Self: Sized,
    {
        GalleryScan::new(self, filter, page_size)
    }
}

/// Keyset-paginated iterator over a [`Gallery`].
pub struct GalleryScan<'a, G: Gallery + ?Sized> {
    gallery: &'a G,
    filter: Option<Category>,
    page_size: usize,
    after_id: Option<i64>,
    buffer: std::vec::IntoIter<EmbeddingRecord>,
    exhausted: bool,
}

impl<'a, G: Gallery + ?Sized> GalleryScan<'a, G> {
    pub fn new(gallery: &'a G, filter: Option<Category>, page_size: usize) -> Self {
        Self {
            gallery,
            filter,
            page_size: page_size.max(1),
            after_id: None,
            buffer: Vec::new().into_iter(),
            exhausted: false,
        }
    }
}

impl<G: Gallery + ?Sized> Iterator for GalleryScan<'_, G> {
    type Item = Result<EmbeddingRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.next() {
                self.after_id = Some(record.embedding_id);
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }

            let page = match self
                .gallery
                .scan_page(self.filter, self.after_id, self.page_size)
            {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            };
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if page.is_empty() {
                return None;
            }
            self.buffer = page.into_iter();
        }
    }
}
