use crate::category::Category;
use crate::error::StorageError;
use chrono::NaiveDate;

/// Maps a matched reference to a display name.
///
/// Must not fail: a missing identity yields [`fallback_label`].
pub trait IdentityResolver: Send + Sync {
    fn resolve_name(&self, category: Category, reference_id: i64) -> String;
}

/// Validity window check for temporary identities.
pub trait ValidityOracle: Send + Sync {
    /// False when `as_of` falls outside the identity's window.
    /// An identity without a window is always valid.
    fn is_valid(&self, reference_id: i64, as_of: NaiveDate) -> Result<bool, StorageError>;
}

/// Deterministic label used when an identity row cannot be read.
pub fn fallback_label(category: Category, reference_id: i64) -> String {
    format!("{category}:{reference_id}")
}

/// Inclusive window test; either bound may be absent.
pub fn within_window(start: Option<NaiveDate>, end: Option<NaiveDate>, as_of: NaiveDate) -> bool {
    start.map_or(true, |s| as_of >= s) && end.map_or(true, |e| as_of <= e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_fallback_label() {
        assert_eq!(fallback_label(Category::TempStaff, 42), "temp_staff:42");
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let start = Some(d(2026, 1, 1));
        let end = Some(d(2026, 1, 31));
        assert!(within_window(start, end, d(2026, 1, 1)));
        assert!(within_window(start, end, d(2026, 1, 31)));
        assert!(!within_window(start, end, d(2025, 12, 31)));
        assert!(!within_window(start, end, d(2026, 2, 1)));
    }

    #[test]
    fn test_open_ended_windows() {
        assert!(within_window(None, None, d(1999, 1, 1)));
        assert!(within_window(None, Some(d(2026, 1, 1)), d(2020, 1, 1)));
        assert!(!within_window(Some(d(2026, 1, 1)), None, d(2025, 6, 1)));
    }
}
