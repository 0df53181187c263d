//! Payload encoding.

use serde::{Deserialize, Serialize};

/// Decoded form of a stored payload: the job kind and its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub kind: String,
    pub data: serde_json::Value,
}

/// Converts envelopes to and from the bytes kept in the store.
pub trait PayloadSerializer: Send + Sync {
    fn serialize(&self, envelope: &JobEnvelope) -> Result<Vec<u8>, String>;

    fn deserialize(&self, payload: &[u8]) -> Result<JobEnvelope, String>;
}

/// JSON payloads: `{"kind": "...", "data": {...}}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn serialize(&self, envelope: &JobEnvelope) -> Result<Vec<u8>, String> {
        serde_json::to_vec(envelope).map_err(|e| e.to_string())
    }

    fn deserialize(&self, payload: &[u8]) -> Result<JobEnvelope, String> {
        serde_json::from_slice(payload).map_err(|e| e.to_string())
    }
}
