//! JSON-path field extraction.

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::config::ConfigError;

/// Default path of the field compared against purge ids.
pub const DEFAULT_JSONPATH: &str = "$.id";

/// Compiled JSON-path expression selecting the field compared against the
/// purge id.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    expression: String,
    path: JsonPath,
}

impl FieldExtractor {
    /// Compile `expression`. Invalid expressions are a configuration error.
    pub fn parse(expression: &str) -> Result<Self, ConfigError> {
        let path = JsonPath::parse(expression)
            .map_err(|e| ConfigError::InvalidJsonPath(expression.to_string(), e.to_string()))?;
        Ok(Self {
            expression: expression.to_string(),
            path,
        })
    }

    /// The expression as configured.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Select exactly one scalar node from `document` and render it as a
    /// string.
    ///
    /// Strings are returned verbatim, numbers and booleans in their JSON text
    /// form. No match, several matches, `null`, arrays and objects are errors.
    pub fn extract(&self, document: &Value) -> Result<String, String> {
        let node = self
            .path
            .query(document)
            .exactly_one()
            .map_err(|e| e.to_string())?;

        match node {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Err("field is null".to_string()),
            Value::Array(_) | Value::Object(_) => Err("field is not a scalar".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_string_field() {
        let extractor = FieldExtractor::parse("$.id").unwrap();
        assert_eq!(extractor.extract(&json!({"id": "abc123"})).unwrap(), "abc123");
    }

    #[test]
    fn test_extract_nested_field() {
        let extractor = FieldExtractor::parse("$.order.ref").unwrap();
        let doc = json!({"order": {"ref": "ord42", "total": 10}});
        assert_eq!(extractor.extract(&doc).unwrap(), "ord42");
    }

    #[test]
    fn test_extract_number_uses_json_text() {
        let extractor = FieldExtractor::parse("$.id").unwrap();
        assert_eq!(extractor.extract(&json!({"id": 42})).unwrap(), "42");
    }

    #[test]
    fn test_extract_missing_field_fails() {
        let extractor = FieldExtractor::parse("$.id").unwrap();
        assert!(extractor.extract(&json!({"other": "x"})).is_err());
    }

    #[test]
    fn test_extract_non_scalar_fails() {
        let extractor = FieldExtractor::parse("$.id").unwrap();
        assert!(extractor.extract(&json!({"id": {"nested": 1}})).is_err());
        assert!(extractor.extract(&json!({"id": null})).is_err());
    }

    #[test]
    fn test_extract_multiple_matches_fails() {
        let extractor = FieldExtractor::parse("$.items[*].id").unwrap();
        let doc = json!({"items": [{"id": "a"}, {"id": "b"}]});
        assert!(extractor.extract(&doc).is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_expression() {
        assert!(matches!(
            FieldExtractor::parse("id["),
            Err(ConfigError::InvalidJsonPath(..))
        ));
    }
}
