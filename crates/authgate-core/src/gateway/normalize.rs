//! Response envelope normalization.
//!
//! The server is inconsistent about response shapes: sometimes a proper
//! envelope, sometimes a bare payload, sometimes a JSON document encoded as
//! a JSON string, sometimes nothing at all. Everything past this point sees
//! a single shape: a JSON object with a `success` marker.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{truncate_body, GatewayError};

/// Key of the success marker added to every envelope
pub const SUCCESS_KEY: &str = "success";

/// Key a non-object payload is wrapped under
pub const DATA_KEY: &str = "data";

/// A successful response in envelope shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    status: StatusCode,
    body: Map<String, Value>,
}

impl NormalizedResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// The envelope's `data` payload
    pub fn data(&self) -> Option<&Value> {
        self.body.get(DATA_KEY)
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// Decode the whole envelope
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        serde_json::from_value(Value::Object(self.body.clone()))
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    /// Decode the `data` payload
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, GatewayError> {
        let data = self
            .data()
            .cloned()
            .ok_or_else(|| GatewayError::InvalidResponse("response has no data".to_string()))?;
        serde_json::from_value(data).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

/// Normalize a 2xx response body.
///
/// - no body (or JSON `null`) becomes `{"success": true}`
/// - a JSON-encoded string is decoded once more before anything else
/// - an object keeps all its fields and gains `"success": true`
/// - any other payload is kept under `data`
pub fn normalize(status: StatusCode, raw: &str) -> Result<NormalizedResponse, GatewayError> {
    let value = decode(raw)?;

    let mut body = match value {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert(DATA_KEY.to_string(), other);
            map
        }
    };
    body.insert(SUCCESS_KEY.to_string(), Value::Bool(true));

    Ok(NormalizedResponse { status, body })
}

/// Decode a body, unwrapping one level of JSON-in-a-string
fn decode(raw: &str) -> Result<Value, GatewayError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(inner)) => parse_str(&inner)?,
        Ok(value) => value,
        // A non-JSON body is itself the string to decode
        Err(_) => parse_str(raw)?,
    };
    Ok(value)
}

fn parse_str(text: &str) -> Result<Value, GatewayError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| {
        GatewayError::InvalidResponse(format!("{} in body: {}", e, truncate_body(text)))
    })
}

/// Best-effort decode of an error body; `None` when it is not JSON
pub(crate) fn decode_error_body(raw: &str) -> Option<Value> {
    decode(raw).ok().filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_empty_body_is_success() {
        let response = normalize(StatusCode::NO_CONTENT, "").unwrap();
        assert_eq!(response.clone().into_value(), json!({"success": true}));
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_object_is_augmented_not_replaced() {
        let response = normalize(
            StatusCode::OK,
            r#"{"message": "Success", "data": {"id": 7}, "status": 200}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_value(),
            json!({"message": "Success", "data": {"id": 7}, "status": 200, "success": true})
        );
    }

    #[test]
    fn test_success_marker_overrides_server_value() {
        let response = normalize(StatusCode::OK, r#"{"success": false, "id": 1}"#).unwrap();
        assert_eq!(response.get("success"), Some(&json!(true)));
        assert_eq!(response.get("id"), Some(&json!(1)));
    }

    #[test]
    fn test_json_encoded_string_is_parsed() {
        let raw = serde_json::to_string(r#"{"access_token": "T2"}"#).unwrap();
        let response = normalize(StatusCode::OK, &raw).unwrap();
        assert_eq!(response.get("access_token"), Some(&json!("T2")));
        assert_eq!(response.get("success"), Some(&json!(true)));
    }

    #[test]
    fn test_bare_array_is_wrapped() {
        let response = normalize(StatusCode::OK, "[1, 2, 3]").unwrap();
        assert_eq!(response.data(), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_null_body_is_success() {
        let response = normalize(StatusCode::OK, "null").unwrap();
        assert_eq!(response.into_value(), json!({"success": true}));
    }

    #[test]
    fn test_unparseable_body_is_invalid() {
        let result = normalize(StatusCode::OK, "<html>oops</html>");
        assert!(matches!(result, Err(GatewayError::InvalidResponse(_))));

        let raw = serde_json::to_string("not json inside").unwrap();
        assert!(matches!(
            normalize(StatusCode::OK, &raw),
            Err(GatewayError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_data_as_decodes_payload() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            id: u32,
        }

        let response = normalize(StatusCode::OK, r#"{"data": {"id": 7}}"#).unwrap();
        assert_eq!(response.data_as::<Item>().unwrap(), Item { id: 7 });

        let empty = normalize(StatusCode::OK, "").unwrap();
        assert!(empty.data_as::<Item>().is_err());
    }

    #[test]
    fn test_decode_error_body() {
        assert_eq!(
            decode_error_body(r#"{"message": "nope"}"#),
            Some(json!({"message": "nope"}))
        );
        assert_eq!(decode_error_body("Bad Gateway"), None);
        assert_eq!(decode_error_body(""), None);
    }
}
