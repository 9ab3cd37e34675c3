//! Access log writer: normalizes and clamps, then appends exactly one row.

use crate::category::Category;
use crate::error::StorageError;
use crate::types::{AccessResult, NewAccessEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Name recorded when nobody was recognized.
pub const UNKNOWN_PERSON: &str = "Unknown";

/// Name recorded when a security officer opens the gate by hand.
pub const MANUAL_OVERRIDE_PERSON: &str = "manual_override";

/// Durable, append-only access log.
pub trait AccessLogStore: Send + Sync {
    /// Persist `event` and return its `log_id`.
    ///
    /// Appending an `attempt_id` that is already stored returns the existing
    /// `log_id` without writing a second row.
    fn append(&self, event: &NewAccessEvent) -> Result<i64, StorageError>;
}

/// Clamp into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[derive(Clone)]
pub struct AccessLogWriter {
    store: Arc<dyn AccessLogStore>,
}

impl AccessLogWriter {
    pub fn new(store: Arc<dyn AccessLogStore>) -> Self {
        Self { store }
    }

    /// Normalize and persist one access event.
    ///
    /// Storage failures propagate: an event that was not recorded must not be
    /// reported as processed.
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        attempt_id: Uuid,
        access_time: DateTime<Utc>,
        recognized_person: Option<&str>,
        category: &str,
        confidence: f32,
        result: AccessResult,
        embedding_id: Option<i64>,
    ) -> Result<i64, StorageError> {
        let event = build_event(
            attempt_id,
            access_time,
            recognized_person,
            category,
            confidence,
            result,
            embedding_id,
        );
        let log_id = self.store.append(&event)?;

        tracing::info!(
            log_id,
            %attempt_id,
            person = %event.recognized_person,
            category = %event.category,
            confidence = event.confidence,
            result = event.access_result.as_str(),
            "access event recorded"
        );
        Ok(log_id)
    }
}

fn build_event(
    attempt_id: Uuid,
    access_time: DateTime<Utc>,
    recognized_person: Option<&str>,
    category: &str,
    confidence: f32,
    access_result: AccessResult,
    embedding_id: Option<i64>,
) -> NewAccessEvent {
    let recognized_person = recognized_person
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_PERSON)
        .to_string();

    NewAccessEvent {
        attempt_id,
        access_time,
        recognized_person,
        category: Category::normalize(category),
        confidence: clamp_confidence(confidence),
        access_result,
        embedding_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryLog;
    use proptest::prelude::*;

    #[test]
    fn test_log_normalizes_category_and_name() {
        let store = Arc::new(MemoryLog::default());
        let writer = AccessLogWriter::new(store.clone());

        writer
            .log(Uuid::new_v4(), Utc::now(), None, "TEMP_WORKER", 0.9, AccessResult::Granted, Some(3))
            .unwrap();
        writer
            .log(Uuid::new_v4(), Utc::now(), Some("  "), "Internal_Staff", 0.1, AccessResult::Denied, None)
            .unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, Category::TempStaff);
        assert_eq!(rows[0].recognized_person, UNKNOWN_PERSON);
        assert_eq!(rows[0].embedding_id, Some(3));
        assert_eq!(rows[1].category, Category::InternalStaff);
        assert_eq!(rows[1].recognized_person, UNKNOWN_PERSON);
    }

    #[test]
    fn test_log_clamps_out_of_range() {
        let store = Arc::new(MemoryLog::default());
        let writer = AccessLogWriter::new(store.clone());
        for c in [-0.4, 1.7, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            writer
                .log(Uuid::new_v4(), Utc::now(), Some("x"), "resident", c, AccessResult::Denied, None)
                .unwrap();
        }
        let stored: Vec<f32> = store.rows().iter().map(|r| r.confidence).collect();
        assert_eq!(stored, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_same_attempt_written_once() {
        let store = Arc::new(MemoryLog::default());
        let writer = AccessLogWriter::new(store.clone());
        let attempt = Uuid::new_v4();
        let a = writer
            .log(attempt, Utc::now(), Some("A"), "resident", 0.5, AccessResult::Denied, None)
            .unwrap();
        let b = writer
            .log(attempt, Utc::now(), Some("A"), "resident", 0.5, AccessResult::Denied, None)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(store.rows().len(), 1);
    }

    #[test]
    fn test_storage_failure_propagates() {
        let store = Arc::new(MemoryLog::default());
        store.fail_appends(true);
        let writer = AccessLogWriter::new(store.clone());
        let err = writer.log(Uuid::new_v4(), Utc::now(), None, "x", 0.0, AccessResult::Denied, None);
        assert!(err.is_err());
        assert!(store.rows().is_empty());
    }

    proptest! {
        #[test]
        fn clamp_matches_min_max(c in any::<f32>()) {
            let clamped = clamp_confidence(c);
            prop_assert!((0.0..=1.0).contains(&clamped));
            if !c.is_nan() {
                prop_assert_eq!(clamped, c.min(1.0).max(0.0));
            }
        }
    }
}
