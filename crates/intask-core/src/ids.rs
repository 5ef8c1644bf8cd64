//! Element keys, parent references and timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};

/// Length of every group, task and activity key.
pub const ID_LEN: usize = 8;

/// Parent reference value meaning "top level".
pub const ROOT_PARENT: &str = "0";

/// Generate a fresh 8-char alphanumeric key.
pub fn generate_id() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), ID_LEN)
}

/// Whether `id` has the shape of an element key.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Where an element hangs in its hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parent {
    /// Top level (stored as `NULL`).
    Root,
    /// Child of the element with this key.
    Id(String),
}

impl Parent {
    /// Parse the wire form: `"0"` for root, otherwise an 8-char key.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == ROOT_PARENT {
            Some(Self::Root)
        } else if is_valid_id(raw) {
            Some(Self::Id(raw.to_string()))
        } else {
            None
        }
    }

    /// The parent key, or `None` for root.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Id(id) => Some(id),
        }
    }

    /// Build from a nullable column value.
    pub fn from_column(value: Option<String>) -> Self {
        value.map_or(Self::Root, Self::Id)
    }
}

/// Current UTC time in the stored timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format a UTC instant the way timestamps are stored.
///
/// Fixed width with millisecond precision so stored values sort
/// lexicographically in time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp and normalize it to the stored format.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| format_timestamp(at.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid() {
        for _ in 0..100 {
            let id = generate_id();
            assert_eq!(id.len(), ID_LEN);
            assert!(is_valid_id(&id));
        }
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn id_validation() {
        assert!(is_valid_id("aB3dE5gH"));
        assert!(!is_valid_id("short"));
        assert!(!is_valid_id("toolong123"));
        assert!(!is_valid_id("with-das"));
    }

    #[test]
    fn parent_parse() {
        assert_eq!(Parent::parse("0"), Some(Parent::Root));
        assert_eq!(
            Parent::parse("abcd1234"),
            Some(Parent::Id("abcd1234".into()))
        );
        assert_eq!(Parent::parse("abc"), None);
        assert_eq!(Parent::parse(""), None);
    }

    #[test]
    fn parent_column_round_trip() {
        assert_eq!(Parent::from_column(None), Parent::Root);
        assert_eq!(Parent::from_column(Some("abcd1234".into())).as_id(), Some("abcd1234"));
    }

    #[test]
    fn timestamps_normalize_to_utc_millis() {
        assert_eq!(
            normalize_timestamp("2019-03-01T10:00:00+03:00").as_deref(),
            Some("2019-03-01T07:00:00.000Z")
        );
        assert_eq!(
            normalize_timestamp("2019-03-01T10:00:00.5Z").as_deref(),
            Some("2019-03-01T10:00:00.500Z")
        );
        assert_eq!(normalize_timestamp("yesterday"), None);
    }

    #[test]
    fn stored_timestamps_sort_in_time_order() {
        let a = normalize_timestamp("2019-03-01T09:59:59.999Z").unwrap();
        let b = normalize_timestamp("2019-03-01T10:00:00Z").unwrap();
        assert!(a < b);
        assert_eq!(now_timestamp().len(), b.len());
    }
}
