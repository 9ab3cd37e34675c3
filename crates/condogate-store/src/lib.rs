//! condogate-store — SQLite persistence for condogate.
//!
//! A single [`SqliteStore`] implements the core's storage seams: the access
//! log ([`condogate_core::AccessLogStore`]), name resolution and the temporary
//! staff validity window. [`SqliteGallery`] is a dimension-bound view over the
//! shared embedding table.

mod access_log;
mod error;
mod gallery;
mod identity;
mod schema;
mod store;

pub use access_log::{LogFilter, LogStats};
pub use error::StoreError;
pub use gallery::{bytes_to_embedding, embedding_to_bytes, SqliteGallery};
pub use store::SqliteStore;
