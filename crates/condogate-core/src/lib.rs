//! condogate-core — face-embedding matching and access decisions.
//!
//! Pipeline: image → [`EmbeddingExtractor`] → query vector → [`CosineMatcher`]
//! over a [`Gallery`] → [`DecisionEngine`] (identity and validity rules) →
//! [`AccessLogWriter`]. The core owns no persistent state; storage and the
//! extractor are injected as trait objects.

pub mod category;
pub mod decision;
pub mod error;
pub mod extractor;
pub mod gallery;
pub mod identity;
pub mod log;
pub mod matcher;
pub mod types;

pub use category::Category;
pub use decision::{confidence_percent, AccessDecision, Decision, DecisionEngine, EngineConfig, Reason};
pub use error::{CoreError, StorageError};
pub use extractor::{EmbeddingExtractor, ExtractError, Extraction};
pub use gallery::{Gallery, GalleryScan};
pub use identity::{fallback_label, within_window, IdentityResolver, ValidityOracle};
pub use log::{
    clamp_confidence, AccessLogStore, AccessLogWriter, MANUAL_OVERRIDE_PERSON, UNKNOWN_PERSON,
};
pub use matcher::{Candidate, CosineMatcher, MatchResult, Verdict, DEFAULT_THRESHOLD};
pub use types::{
    l2_normalize, validate_vector, AccessEvent, AccessResult, EmbeddingRecord, NewAccessEvent,
    ATTENDANCE_EMBEDDING_DIM, FACE_EMBEDDING_DIM,
};

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory collaborators for unit tests.

    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Unit vector along axis `axis`.
    pub fn basis(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis] = 1.0;
        v
    }

    pub struct MemoryGallery {
        dimension: usize,
        rows: Mutex<Vec<EmbeddingRecord>>,
        fail: AtomicBool,
    }

    impl MemoryGallery {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                rows: Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }
        }

        pub fn fail_scans(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl Gallery for MemoryGallery {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn insert(&self, category: Category, reference_id: i64, vector: &[f32]) -> Result<i64, CoreError> {
            validate_vector(vector, self.dimension)?;
            let mut rows = self.rows.lock().unwrap();
            let embedding_id = rows.len() as i64 + 1;
            rows.push(EmbeddingRecord {
                embedding_id,
                category,
                reference_id,
                vector: vector.to_vec(),
            });
            Ok(embedding_id)
        }

        fn scan_page(
            &self,
            filter: Option<Category>,
            after_id: Option<i64>,
            limit: usize,
        ) -> Result<Vec<EmbeddingRecord>, StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::new("gallery offline"));
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| filter.map_or(true, |c| r.category == c))
                .filter(|r| after_id.map_or(true, |a| r.embedding_id > a))
                .take(limit)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    pub struct MemoryLog {
        rows: Mutex<Vec<AccessEvent>>,
        fail: AtomicBool,
    }

    impl MemoryLog {
        pub fn rows(&self) -> Vec<AccessEvent> {
            self.rows.lock().unwrap().clone()
        }

        pub fn fail_appends(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl AccessLogStore for MemoryLog {
        fn append(&self, event: &NewAccessEvent) -> Result<i64, StorageError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::new("log offline"));
            }
            let mut rows = self.rows.lock().unwrap();
            if let Some(existing) = rows.iter().find(|r| r.attempt_id == event.attempt_id) {
                return Ok(existing.log_id);
            }
            let log_id = rows.len() as i64 + 1;
            rows.push(AccessEvent {
                log_id,
                attempt_id: event.attempt_id,
                access_time: event.access_time,
                recognized_person: event.recognized_person.clone(),
                category: event.category,
                confidence: event.confidence,
                access_result: event.access_result,
                embedding_id: event.embedding_id,
            });
            Ok(log_id)
        }
    }

    #[derive(Default)]
    pub struct MemoryIdentities {
        names: Mutex<HashMap<(Category, i64), String>>,
        windows: Mutex<HashMap<i64, (Option<NaiveDate>, Option<NaiveDate>)>>,
        next: Mutex<i64>,
    }

    impl MemoryIdentities {
        pub fn add(&self, category: Category, name: &str) -> i64 {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            self.names
                .lock()
                .unwrap()
                .insert((category, *next), name.to_string());
            *next
        }

        pub fn set_window(&self, id: i64, start: Option<NaiveDate>, end: Option<NaiveDate>) {
            self.windows.lock().unwrap().insert(id, (start, end));
        }
    }

    impl IdentityResolver for MemoryIdentities {
        fn resolve_name(&self, category: Category, reference_id: i64) -> String {
            self.names
                .lock()
                .unwrap()
                .get(&(category, reference_id))
                .cloned()
                .unwrap_or_else(|| fallback_label(category, reference_id))
        }
    }

    impl ValidityOracle for MemoryIdentities {
        fn is_valid(&self, reference_id: i64, as_of: NaiveDate) -> Result<bool, StorageError> {
            Ok(match self.windows.lock().unwrap().get(&reference_id) {
                Some((start, end)) => within_window(*start, *end, as_of),
                None => true,
            })
        }
    }

    pub struct Fixture {
        pub gallery: Arc<MemoryGallery>,
        pub log: Arc<MemoryLog>,
        pub identities: Arc<MemoryIdentities>,
    }

    impl Fixture {
        pub fn new(dimension: usize) -> Self {
            Self {
                gallery: Arc::new(MemoryGallery::new(dimension)),
                log: Arc::new(MemoryLog::default()),
                identities: Arc::new(MemoryIdentities::default()),
            }
        }

        pub fn engine(&self, config: EngineConfig) -> DecisionEngine {
            DecisionEngine::new(
                self.gallery.clone(),
                self.identities.clone(),
                self.identities.clone(),
                self.log.clone(),
                config,
            )
            .unwrap()
        }
    }

    #[derive(Default)]
    pub struct ExtractorState {
        initialized: AtomicBool,
        closed: AtomicBool,
    }

    impl ExtractorState {
        pub fn initialized(&self) -> bool {
            self.initialized.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    pub const SCRIPTED_DIM: usize = 8;

    /// Extractor returning a fixed outcome for every image.
    pub struct ScriptedExtractor {
        outcome: Result<Extraction, String>,
        invalid_image: bool,
        state: Arc<ExtractorState>,
    }

    impl ScriptedExtractor {
        pub fn face(values: Vec<f32>) -> Self {
            Self {
                outcome: Ok(Extraction::Face(values)),
                invalid_image: false,
                state: Arc::default(),
            }
        }

        pub fn no_face() -> Self {
            Self {
                outcome: Ok(Extraction::NoFace),
                invalid_image: false,
                state: Arc::default(),
            }
        }

        pub fn failing(err: ExtractError) -> Self {
            Self {
                invalid_image: matches!(err, ExtractError::InvalidImage(_)),
                outcome: Err(err.to_string()),
                state: Arc::default(),
            }
        }

        pub fn state(&self) -> Arc<ExtractorState> {
            self.state.clone()
        }
    }

    impl EmbeddingExtractor for ScriptedExtractor {
        fn dimension(&self) -> usize {
            SCRIPTED_DIM
        }

        fn init(&self) -> Result<(), ExtractError> {
            self.state.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn extract(&self, _image: &[u8]) -> Result<Extraction, ExtractError> {
            if self.state.closed() {
                return Err(ExtractError::Closed);
            }
            match &self.outcome {
                Ok(outcome) => Ok(outcome.clone()),
                Err(msg) if self.invalid_image => Err(ExtractError::InvalidImage(msg.clone())),
                Err(msg) => Err(ExtractError::Unavailable(msg.clone())),
            }
        }

        fn shutdown(&self) {
            self.state.closed.store(true, Ordering::SeqCst);
        }
    }
}
