// Request body decoding.
//
// external-dns sends JSON bodies on GET requests and does not always set a
// Content-Type, so axum's `Json` extractor (which insists on
// `application/json`) cannot be used. `Payload<T>` reads the raw bytes and
// decodes them whatever the headers say.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    dns::{Changes, Endpoint, ModelError, PropertyValuesEqualRequest},
    error::WebhookError,
};

/// Top-level JSON shape a payload must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn admits(self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
        }
    }
}

/// A request body the adapter knows how to decode.
///
/// The shape is checked before deserialising because serde happily builds a
/// struct out of a JSON array.
pub trait WirePayload: DeserializeOwned + Send {
    const SHAPE: Shape;

    fn validate(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

impl WirePayload for Changes {
    const SHAPE: Shape = Shape::Object;

    fn validate(&self) -> Result<(), ModelError> {
        Changes::validate(self)
    }
}

impl WirePayload for Vec<Endpoint> {
    const SHAPE: Shape = Shape::Array;

    fn validate(&self) -> Result<(), ModelError> {
        self.iter().try_for_each(Endpoint::validate)
    }
}

impl WirePayload for PropertyValuesEqualRequest {
    const SHAPE: Shape = Shape::Object;
}

/// Decode a payload from raw body bytes.
pub fn decode<T: WirePayload>(bytes: &[u8]) -> Result<T, WebhookError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| WebhookError::MalformedRequest(e.to_string()))?;
    if !T::SHAPE.admits(&value) {
        return Err(WebhookError::MalformedRequest(format!(
            "expected a JSON {:?}",
            T::SHAPE
        )));
    }
    let payload: T = serde_json::from_value(value)
        .map_err(|e| WebhookError::MalformedRequest(e.to_string()))?;
    payload
        .validate()
        .map_err(|e| WebhookError::MalformedRequest(e.to_string()))?;
    Ok(payload)
}

/// Extractor for a JSON body that ignores the request Content-Type.
#[derive(Debug)]
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: WirePayload,
{
    type Rejection = WebhookError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| WebhookError::MalformedRequest(e.body_text()))?;
        decode(&bytes).map(Payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_top_level_shape() {
        assert!(decode::<Changes>(b"[]").is_err());
        assert!(decode::<Vec<Endpoint>>(b"{}").is_err());
        assert!(decode::<PropertyValuesEqualRequest>(br#"["a","b","c"]"#).is_err());
    }

    #[test]
    fn rejects_invalid_json_and_empty_bodies() {
        assert!(decode::<Changes>(b"").is_err());
        assert!(decode::<Changes>(b"{not json").is_err());
        assert!(decode::<Changes>(br#"{"create": {}}"#).is_err());
    }

    #[test]
    fn runs_model_validation() {
        let err = decode::<Changes>(
            br#"{"updateOld": [{"dnsName": "a.example.com", "recordType": "A"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("updateNew"));

        assert!(decode::<Vec<Endpoint>>(br#"[{"dnsName": "", "recordType": "A"}]"#).is_err());
    }

    #[test]
    fn accepts_well_formed_payloads() {
        let changes: Changes = decode(b"{}\n").unwrap();
        assert!(changes.is_empty());

        let req: PropertyValuesEqualRequest =
            decode(br#"{"name":"ttl","previous":"300","current":"300"}"#).unwrap();
        assert_eq!(req.name, "ttl");
    }
}
