//! Book metadata as delivered by the viewer manifest.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A metadata value that is neither a string nor a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported metadata type for `{key}`: expected a string or a list of strings")]
pub struct UnsupportedMetadata {
    /// Offending key.
    pub key: String,
}

/// Key/value metadata of a book (`title`, `creator`, `date`, ...).
///
/// Read-only after extraction. Serializes as the plain JSON object, which is
/// what `metadata.json` contains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Wraps a JSON object.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Field as a single string; lists are joined with `"; "`.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedMetadata`] for numbers, objects, or lists holding
    /// anything but strings.
    pub fn text(&self, key: &str) -> Result<Option<String>, UnsupportedMetadata> {
        let unsupported = || UnsupportedMetadata {
            key: key.to_string(),
        };
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(Value::Array(items)) => {
                let parts = items
                    .iter()
                    .map(|item| item.as_str().ok_or_else(unsupported))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(parts.join("; ")))
            }
            Some(_) => Err(unsupported()),
        }
    }

    /// Year from the first four characters of the `date` field.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        let date = self.0.get("date")?.as_str()?;
        let year: String = date.chars().take(4).collect();
        if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
            year.parse().ok()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => Metadata::new(map),
            _ => Metadata::default(),
        }
    }

    #[test]
    fn test_text_plain_string() {
        let meta = metadata(json!({ "title": "A Book" }));
        assert_eq!(meta.text("title"), Ok(Some("A Book".to_string())));
    }

    #[test]
    fn test_text_list_is_joined() {
        let meta = metadata(json!({ "creator": ["A", "B"] }));
        assert_eq!(meta.text("creator"), Ok(Some("A; B".to_string())));
    }

    #[test]
    fn test_text_missing_is_none() {
        assert_eq!(Metadata::default().text("creator"), Ok(None));
    }

    #[test]
    fn test_text_number_is_unsupported() {
        let meta = metadata(json!({ "title": 42 }));
        assert_eq!(
            meta.text("title"),
            Err(UnsupportedMetadata {
                key: "title".to_string()
            })
        );
    }

    #[test]
    fn test_text_list_with_non_string_is_unsupported() {
        let meta = metadata(json!({ "creator": ["A", 1] }));
        assert!(meta.text("creator").is_err());
    }

    #[test]
    fn test_year_from_full_date() {
        let meta = metadata(json!({ "date": "1923-05-01" }));
        assert_eq!(meta.year(), Some(1923));
    }

    #[test]
    fn test_year_from_bare_year() {
        assert_eq!(metadata(json!({ "date": "1871" })).year(), Some(1871));
    }

    #[test]
    fn test_year_unparsable_is_none() {
        assert_eq!(metadata(json!({ "date": "c. 1900" })).year(), None);
        assert_eq!(metadata(json!({ "date": "19" })).year(), None);
        assert_eq!(metadata(json!({ "date": ["1923"] })).year(), None);
        assert_eq!(Metadata::default().year(), None);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let meta = metadata(json!({ "title": "T" }));
        let rendered = serde_json::to_string(&meta).unwrap_or_default();
        assert_eq!(rendered, r#"{"title":"T"}"#);
    }
}
