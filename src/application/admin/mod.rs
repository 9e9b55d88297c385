//! Back-office write services. Every mutation invalidates the cache entries it
//! made stale before returning.

pub mod articles;
pub mod categories;
pub mod chapters;
pub mod courses;
pub mod memberships;
pub mod orders;
pub mod settings;
pub mod users;

use serde::{Deserialize, Deserializer};

use crate::application::error::ServiceError;

/// Trim text input. Whitespace-only values become empty strings, not `None`.
pub(crate) fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

/// Tells an explicit `null` (`Some(None)`) apart from a missing field (`None`).
/// Pair with `#[serde(default)]`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Trimmed nullable text; an empty string clears the field too.
pub(crate) fn cleared(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|v| trimmed(v).filter(|s| !s.is_empty()))
}

pub(crate) fn rank_value(rank: Option<i64>) -> Result<i32, ServiceError> {
    let rank = rank.unwrap_or(1);
    i32::try_from(rank).map_err(|_| ServiceError::validation("rank is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "nullable")]
        video: Option<Option<String>>,
    }

    #[test]
    fn null_clears_and_missing_keeps() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"video": null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"video": " https://v.example "}"#).unwrap();
        assert_eq!(missing.video, None);
        assert_eq!(null.video, Some(None));
        assert_eq!(
            cleared(set.video),
            Some(Some("https://v.example".to_string()))
        );
        assert_eq!(cleared(Some(Some("  ".into()))), Some(None));
    }

    #[test]
    fn rank_defaults_and_rejects_overflow() {
        assert_eq!(rank_value(None).unwrap(), 1);
        assert_eq!(rank_value(Some(7)).unwrap(), 7);
        assert!(rank_value(Some(i64::from(i32::MAX) + 1)).is_err());
    }
}
