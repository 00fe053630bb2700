//! Wire types shared across the HTTP boundary

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Poll status value that terminates a sign-in attempt.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Uniform JSON response envelope: `{ success, data?, error? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Result of starting a sign-in: a browser-navigable hand-off URL plus the
/// correlation id that every later poll must echo unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigninHandle {
    pub url: String,
    pub signin_id: String,
}

/// One poll response, relayed verbatim from the upstream service.
///
/// The account payload field is named by the brand config's `data_path`, so
/// it is captured here through the flattened remainder rather than a fixed
/// field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(STATUS_SUCCESS)
    }

    /// The raw account payload under the brand's `data_path`, if present.
    pub fn payload(&self, data_path: &str) -> Option<&Value> {
        self.extra.get(data_path)
    }
}

/// Normalized account record handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
}

/// Source field names for each canonical `BookRecord` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMap {
    pub title: String,
    pub date: String,
    pub image: String,
    pub url: String,
    pub rating: String,
}

/// How to locate and reshape a brand's raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSchema {
    /// Name of the payload field in poll responses.
    pub data_path: String,
    pub fields: FieldMap,
}

/// Per-brand configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub brand_id: String,
    pub brand_name: String,
    #[serde(rename = "dataTransform")]
    pub data_transform: TransformSchema,
}

impl BrandConfig {
    /// Built-in Goodreads brand: upstream rows carry `title`, `added_date`,
    /// `cover`, `url` and `rating`, and the payload field is `books`.
    pub fn goodreads() -> Self {
        Self {
            brand_id: "goodreads".to_string(),
            brand_name: "Goodreads".to_string(),
            data_transform: TransformSchema {
                data_path: "books".to_string(),
                fields: FieldMap {
                    title: "title".to_string(),
                    date: "added_date".to_string(),
                    image: "cover".to_string(),
                    url: "url".to_string(),
                    rating: "rating".to_string(),
                },
            },
        }
    }
}

/// Geolocation context attached to upstream channels and proxied bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub ip: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ok_roundtrip() {
        let env = Envelope::ok(SigninHandle {
            url: "http://localhost:3001/dpage/abc".to_string(),
            signin_id: "sid-1".to_string(),
        });
        let json = serde_json::to_string(&env).expect("serialize");
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("error"));

        let parsed: Envelope<SigninHandle> = serde_json::from_str(&json).expect("parse");
        assert!(parsed.success);
        assert_eq!(parsed.data.expect("data").signin_id, "sid-1");
    }

    #[test]
    fn envelope_err_omits_data() {
        let env: Envelope<SigninHandle> = Envelope::err("No signin URL found");
        let json = serde_json::to_string(&env).expect("serialize");
        assert_eq!(json, r#"{"success":false,"error":"No signin URL found"}"#);
    }

    #[test]
    fn poll_outcome_captures_dynamic_payload_field() {
        let json = r#"{
          "status": "SUCCESS",
          "message": "done",
          "books": [{"title":"Dune","rating":"5"}]
        }"#;

        let outcome: PollOutcome = serde_json::from_str(json).expect("parse");
        assert!(outcome.is_success());
        assert_eq!(outcome.message.as_deref(), Some("done"));
        let payload = outcome.payload("books").expect("payload");
        assert_eq!(payload.as_array().expect("array").len(), 1);
        assert!(outcome.payload("orders").is_none());
    }

    #[test]
    fn poll_outcome_pending_without_payload() {
        let json = r#"{"status":"PENDING"}"#;
        let outcome: PollOutcome = serde_json::from_str(json).expect("parse");
        assert!(!outcome.is_success());
        assert!(outcome.extra.is_empty());
    }

    #[test]
    fn brand_config_parses_camel_case_transform() {
        let json = r#"{
          "brand_id": "goodreads",
          "brand_name": "Goodreads",
          "dataTransform": {
            "dataPath": "books",
            "fields": {
              "title": "title",
              "date": "added_date",
              "image": "cover",
              "url": "url",
              "rating": "rating"
            }
          }
        }"#;

        let config: BrandConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(config.data_transform.data_path, "books");
        assert_eq!(config.data_transform.fields.date, "added_date");
    }
}
