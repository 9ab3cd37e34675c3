//! Closed identity taxonomy shared by the gallery, the matcher and the access log.
//!
//! Upstream producers spell categories many ways (`RESIDENT`, `Internal_Staff`,
//! `TEMP_WORKER`, `admin`). [`Category::normalize`] is the one place where those
//! spellings are folded into the canonical set; it is total and idempotent.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of identity an embedding or access event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Resident,
    Visitor,
    SecurityOfficer,
    InternalStaff,
    TempStaff,
    Admin,
    Unknown,
}

/// Alias spellings after case folding and separator folding.
const ALIASES: &[(&str, Category)] = &[
    ("resident", Category::Resident),
    ("residents", Category::Resident),
    ("visitor", Category::Visitor),
    ("visitors", Category::Visitor),
    ("guest", Category::Visitor),
    ("security_officer", Category::SecurityOfficer),
    ("securityofficer", Category::SecurityOfficer),
    ("security", Category::SecurityOfficer),
    ("officer", Category::SecurityOfficer),
    ("guard", Category::SecurityOfficer),
    ("internal_staff", Category::InternalStaff),
    ("internalstaff", Category::InternalStaff),
    ("internal", Category::InternalStaff),
    ("staff", Category::InternalStaff),
    ("temp_staff", Category::TempStaff),
    ("tempstaff", Category::TempStaff),
    ("temp_worker", Category::TempStaff),
    ("tempworker", Category::TempStaff),
    ("temporary_staff", Category::TempStaff),
    ("temporary_worker", Category::TempStaff),
    ("temp", Category::TempStaff),
    ("admin", Category::Admin),
    ("administrator", Category::Admin),
    ("unknown", Category::Unknown),
];

impl Category {
    /// Every category, canonical order.
    pub const ALL: [Category; 7] = [
        Category::Resident,
        Category::Visitor,
        Category::SecurityOfficer,
        Category::InternalStaff,
        Category::TempStaff,
        Category::Admin,
        Category::Unknown,
    ];

    /// Canonical lower-snake-case spelling, as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Resident => "resident",
            Category::Visitor => "visitor",
            Category::SecurityOfficer => "security_officer",
            Category::InternalStaff => "internal_staff",
            Category::TempStaff => "temp_staff",
            Category::Admin => "admin",
            Category::Unknown => "unknown",
        }
    }

    /// Map any spelling onto the taxonomy. Unrecognized input becomes `Unknown`.
    pub fn normalize(raw: &str) -> Category {
        let folded: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' | '.' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        ALIASES
            .iter()
            .find(|(alias, _)| *alias == folded)
            .map(|(_, category)| *category)
            .unwrap_or(Category::Unknown)
    }

    /// Interpret an optional caller hint used to filter the gallery.
    ///
    /// Empty and unrecognized hints mean "no filter".
    pub fn parse_hint(raw: &str) -> Option<Category> {
        if raw.trim().is_empty() {
            return None;
        }
        match Category::normalize(raw) {
            Category::Unknown => {
                tracing::warn!(hint = raw, "unrecognized category hint; scanning whole gallery");
                None
            }
            category => Some(category),
        }
    }

    /// Only temporary staff carry a validity window.
    pub fn has_validity_window(self) -> bool {
        self == Category::TempStaff
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Category::normalize(s))
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Category::normalize(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_observed_spellings() {
        assert_eq!(Category::normalize("RESIDENT"), Category::Resident);
        assert_eq!(Category::normalize("Internal_Staff"), Category::InternalStaff);
        assert_eq!(Category::normalize("TEMP_WORKER"), Category::TempStaff);
        assert_eq!(Category::normalize("Temp_Staff"), Category::TempStaff);
        assert_eq!(Category::normalize("admin"), Category::Admin);
        assert_eq!(Category::normalize("ADMIN"), Category::Admin);
        assert_eq!(Category::normalize("security-officer"), Category::SecurityOfficer);
        assert_eq!(Category::normalize("  visitor "), Category::Visitor);
    }

    #[test]
    fn test_unrecognized_is_unknown() {
        assert_eq!(Category::normalize(""), Category::Unknown);
        assert_eq!(Category::normalize("janitor"), Category::Unknown);
        assert_eq!(Category::normalize("résident"), Category::Unknown);
    }

    #[test]
    fn test_canonical_strings_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::normalize(category.as_str()), category);
        }
    }

    #[test]
    fn test_parse_hint() {
        assert_eq!(Category::parse_hint(""), None);
        assert_eq!(Category::parse_hint("   "), None);
        assert_eq!(Category::parse_hint("nonsense"), None);
        assert_eq!(Category::parse_hint("unknown"), None);
        assert_eq!(Category::parse_hint("Resident"), Some(Category::Resident));
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let json = serde_json::to_string(&Category::TempStaff).unwrap();
        assert_eq!(json, "\"temp_staff\"");
        let back: Category = serde_json::from_str("\"TEMP_WORKER\"").unwrap();
        assert_eq!(back, Category::TempStaff);
    }

    #[test]
    fn test_only_temp_staff_has_window() {
        for category in Category::ALL {
            assert_eq!(category.has_validity_window(), category == Category::TempStaff);
        }
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in ".{0,24}") {
            let once = Category::normalize(&raw);
            prop_assert_eq!(Category::normalize(once.as_str()), once);
            prop_assert!(Category::ALL.contains(&once));
        }

        #[test]
        fn alias_case_insensitive(idx in 0usize..ALIASES.len(), upper in any::<bool>()) {
            let (alias, expected) = ALIASES[idx];
            let spelled = if upper { alias.to_ascii_uppercase() } else { alias.to_string() };
            prop_assert_eq!(Category::normalize(&spelled), expected);
        }
    }
}
