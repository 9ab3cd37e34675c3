//! Access log table: append path for the decision engine plus reporting queries.

use crate::error::StoreError;
use crate::store::{format_time, parse_time, SqliteStore};
use chrono::{DateTime, Duration, Utc};
use condogate_core::{
    AccessEvent, AccessLogStore, AccessResult, Category, NewAccessEvent, StorageError,
    MANUAL_OVERRIDE_PERSON, UNKNOWN_PERSON,
};
use rusqlite::{params, Row};
use serde::Serialize;
use uuid::Uuid;

const SELECT_EVENT: &str = "SELECT log_id, attempt_id, access_time, recognized_person, category,
        confidence, access_result, embedding_id FROM access_logs";

/// Optional constraints for [`SqliteStore::filter_logs`]. `to` is exclusive.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub category: Option<Category>,
    pub result: Option<AccessResult>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Aggregate counts over a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub total: u64,
    pub granted: u64,
    pub denied: u64,
    /// Distinct recognized names, excluding the unknown and manual override sentinels.
    pub unique_people: u64,
}

impl AccessLogStore for SqliteStore {
    fn append(&self, event: &NewAccessEvent) -> Result<i64, StorageError> {
        let conn = self.conn()?;
        let attempt = event.attempt_id.to_string();
        let inserted = conn
            .execute(
                "INSERT INTO access_logs
                    (attempt_id, access_time, recognized_person, category, confidence, access_result, embedding_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (attempt_id) DO NOTHING",
                params![
                    attempt,
                    format_time(event.access_time),
                    event.recognized_person,
                    event.category.as_str(),
                    f64::from(event.confidence),
                    event.access_result.as_str(),
                    event.embedding_id,
                ],
            )
            .map_err(StoreError::from)?;

        if inserted == 0 {
            tracing::debug!(attempt_id = %event.attempt_id, "access event already recorded");
        }

        let log_id = conn
            .query_row(
                "SELECT log_id FROM access_logs WHERE attempt_id = ?1",
                [attempt],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(log_id)
    }
}

impl SqliteStore {
    /// Most recent events first.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<AccessEvent>, StoreError> {
        self.filter_logs(&LogFilter {
            limit,
            ..LogFilter::default()
        })
    }

    pub fn filter_logs(&self, filter: &LogFilter) -> Result<Vec<AccessEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EVENT}
             WHERE (?1 IS NULL OR category = ?1)
               AND (?2 IS NULL OR access_result = ?2)
               AND (?3 IS NULL OR access_time >= ?3)
               AND (?4 IS NULL OR access_time < ?4)
             ORDER BY access_time DESC, log_id DESC
             LIMIT ?5"
        ))?;
        let raw = stmt
            .query_map(
                params![
                    filter.category.map(Category::as_str),
                    filter.result.map(AccessResult::as_str),
                    filter.from.map(format_time),
                    filter.to.map(format_time),
                    filter.limit as i64,
                ],
                RawEvent::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawEvent::into_event).collect()
    }

    /// Events of the UTC calendar day containing `now`.
    pub fn today_logs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<AccessEvent>, StoreError> {
        let start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        self.filter_logs(&LogFilter {
            from: Some(start),
            to: Some(start + Duration::days(1)),
            limit,
            ..LogFilter::default()
        })
    }

    /// Every event that references `embedding_id`.
    pub fn logs_for_embedding(&self, embedding_id: i64) -> Result<Vec<AccessEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EVENT} WHERE embedding_id = ?1 ORDER BY access_time DESC, log_id DESC"
        ))?;
        let raw = stmt
            .query_map([embedding_id], RawEvent::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawEvent::into_event).collect()
    }

    /// Counts over the last `days` days ending at `now`.
    pub fn log_stats(&self, days: u32, now: DateTime<Utc>) -> Result<LogStats, StoreError> {
        let since = now - Duration::days(i64::from(days));
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN access_result = 'granted' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN access_result = 'denied' THEN 1 ELSE 0 END), 0),
                    COUNT(DISTINCT CASE WHEN recognized_person NOT IN (?2, ?3) THEN recognized_person END)
             FROM access_logs
             WHERE access_time >= ?1",
            params![format_time(since), UNKNOWN_PERSON, MANUAL_OVERRIDE_PERSON],
            |row| {
                Ok(LogStats {
                    total: row.get::<_, i64>(0)? as u64,
                    granted: row.get::<_, i64>(1)? as u64,
                    denied: row.get::<_, i64>(2)? as u64,
                    unique_people: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

/// Column values as read, before parsing.
struct RawEvent {
    log_id: i64,
    attempt_id: String,
    access_time: String,
    recognized_person: String,
    category: String,
    confidence: f64,
    access_result: String,
    embedding_id: Option<i64>,
}

impl RawEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            log_id: row.get(0)?,
            attempt_id: row.get(1)?,
            access_time: row.get(2)?,
            recognized_person: row.get(3)?,
            category: row.get(4)?,
            confidence: row.get(5)?,
            access_result: row.get(6)?,
            embedding_id: row.get(7)?,
        })
    }

    fn into_event(self) -> Result<AccessEvent, StoreError> {
        let attempt_id = Uuid::parse_str(&self.attempt_id)
            .map_err(|e| StoreError::Corrupt(format!("attempt_id '{}': {e}", self.attempt_id)))?;
        Ok(AccessEvent {
            log_id: self.log_id,
            attempt_id,
            access_time: parse_time(&self.access_time)?,
            recognized_person: self.recognized_person,
            category: Category::normalize(&self.category),
            confidence: self.confidence as f32,
            access_result: AccessResult::from_stored(&self.access_result),
            embedding_id: self.embedding_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(at: DateTime<Utc>, person: &str, category: Category, result: AccessResult) -> NewAccessEvent {
        NewAccessEvent {
            attempt_id: Uuid::new_v4(),
            access_time: at,
            recognized_person: person.to_string(),
            category,
            confidence: 0.5,
            access_result: result,
            embedding_id: None,
        }
    }

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_append_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = event(t(1, 9), "Mei Tan", Category::Resident, AccessResult::Granted);
        e.embedding_id = Some(42);
        e.confidence = 0.93;
        let log_id = store.append(&e).unwrap();

        let rows = store.recent_logs(10).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.log_id, log_id);
        assert_eq!(row.attempt_id, e.attempt_id);
        assert_eq!(row.access_time, e.access_time);
        assert_eq!(row.recognized_person, "Mei Tan");
        assert_eq!(row.category, Category::Resident);
        assert!((row.confidence - 0.93).abs() < 1e-6);
        assert_eq!(row.access_result, AccessResult::Granted);
        assert_eq!(row.embedding_id, Some(42));
    }

    #[test]
    fn test_append_is_idempotent_per_attempt() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = event(t(1, 9), "A", Category::Visitor, AccessResult::Denied);
        let first = store.append(&e).unwrap();
        let second = store.append(&e).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.recent_logs(10).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_confidence_rejected_by_schema() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = event(t(1, 9), "A", Category::Visitor, AccessResult::Denied);
        e.confidence = 1.5;
        assert!(store.append(&e).is_err());
    }

    #[test]
    fn test_filter_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(&event(t(1, 9), "A", Category::Resident, AccessResult::Granted)).unwrap();
        store.append(&event(t(2, 9), "B", Category::Visitor, AccessResult::Denied)).unwrap();
        store.append(&event(t(3, 9), "C", Category::Resident, AccessResult::Denied)).unwrap();

        let recent = store.recent_logs(2).unwrap();
        let names: Vec<_> = recent.iter().map(|e| e.recognized_person.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);

        let residents = store
            .filter_logs(&LogFilter {
                category: Some(Category::Resident),
                limit: 10,
                ..LogFilter::default()
            })
            .unwrap();
        assert_eq!(residents.len(), 2);

        let denied_window = store
            .filter_logs(&LogFilter {
                result: Some(AccessResult::Denied),
                from: Some(t(2, 0)),
                to: Some(t(3, 0)),
                limit: 10,
                ..LogFilter::default()
            })
            .unwrap();
        assert_eq!(denied_window.len(), 1);
        assert_eq!(denied_window[0].recognized_person, "B");
    }

    #[test]
    fn test_today_and_embedding_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut hit = event(t(4, 23), "A", Category::Resident, AccessResult::Granted);
        hit.embedding_id = Some(7);
        store.append(&hit).unwrap();
        store.append(&event(t(5, 0), "B", Category::Resident, AccessResult::Granted)).unwrap();

        let today = store.today_logs(t(4, 12), 50).unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].recognized_person, "A");

        let by_embedding = store.logs_for_embedding(7).unwrap();
        assert_eq!(by_embedding.len(), 1);
        assert!(store.logs_for_embedding(8).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append(&event(t(1, 9), "A", Category::Resident, AccessResult::Granted)).unwrap();
        store.append(&event(t(10, 9), "A", Category::Resident, AccessResult::Granted)).unwrap();
        store.append(&event(t(10, 10), UNKNOWN_PERSON, Category::Unknown, AccessResult::Denied)).unwrap();
        store.append(&event(t(11, 9), "B", Category::Visitor, AccessResult::Denied)).unwrap();
        store
            .append(&event(t(11, 10), MANUAL_OVERRIDE_PERSON, Category::SecurityOfficer, AccessResult::Granted))
            .unwrap();

        let stats = store.log_stats(3, t(12, 0)).unwrap();
        assert_eq!(
            stats,
            LogStats {
                total: 4,
                granted: 2,
                denied: 2,
                unique_people: 2,
            }
        );

        let empty = SqliteStore::open_in_memory().unwrap().log_stats(30, t(12, 0)).unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.granted, 0);
    }
}
