//! Opaque mutation payload.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque serialized mutation body.
///
/// The queue and cache never interpret payload bytes; only the conflict
/// resolver parses them (as JSON) when a field-level merge is required.
/// A payload is owned exclusively by its action until the action syncs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Creates a payload from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Creates an empty payload.
    ///
    /// Used by delete and transition actions that carry no body.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Encodes a JSON value as a payload.
    pub fn from_json(value: &serde_json::Value) -> ModelResult<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ModelError::malformed_payload(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Parses the payload as a JSON value.
    pub fn to_json(&self) -> ModelResult<serde_json::Value> {
        serde_json::from_slice(&self.0).map_err(|e| ModelError::malformed_payload(e.to_string()))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads are opaque and can hold site data; show only the size.
        write!(f, "Payload({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_roundtrip() {
        let value = json!({"hours": 8, "crew": ["ana", "bo"]});
        let payload = Payload::from_json(&value).unwrap();
        assert_eq!(payload.to_json().unwrap(), value);
    }

    #[test]
    fn empty_payload() {
        let payload = Payload::empty();
        assert!(payload.is_empty());
        assert_eq!(payload.len(), 0);
    }

    #[test]
    fn to_json_rejects_garbage() {
        let payload = Payload::from_bytes(vec![0xFF, 0x00, 0x12]);
        assert!(payload.to_json().is_err());
    }

    #[test]
    fn debug_hides_content() {
        let payload = Payload::from_bytes(b"secret incident report".to_vec());
        let shown = format!("{payload:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("22 bytes"));
    }
}
