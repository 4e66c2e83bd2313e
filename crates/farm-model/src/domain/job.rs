use serde::{Deserialize, Serialize};

use crate::{ContextSnapshot, WireError, wire::blob};

/// Job message as it travels on the durable job queue.
///
/// Positional and keyword arguments are serialized independently; each blob may be compressed
/// on its own and the matching flag records whether it was.
/// The body is JSON with the blobs base64 encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobMessage {
    /// Stable, module-qualified name of the callable (e.g. `"billing::jobs::send_invoice"`).
    pub callable_reference: String,
    /// Serialized positional arguments.
    #[serde(with = "blob", default)]
    pub args_blob: Vec<u8>,
    /// Serialized keyword arguments.
    #[serde(with = "blob", default)]
    pub kwargs_blob: Vec<u8>,
    #[serde(default)]
    pub args_compressed: bool,
    #[serde(default)]
    pub kwargs_compressed: bool,
    /// Ambient state captured by the publisher and restored for the callable.
    #[serde(default)]
    pub context_snapshot: ContextSnapshot,
}

impl JobMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::from)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(body).map_err(WireError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JobMessage {
        let mut context_snapshot = ContextSnapshot::default();
        context_snapshot.insert("locale", "de").unwrap();

        JobMessage {
            callable_reference: "reports::jobs::build".to_string(),
            args_blob: vec![0, 1, 2, 255],
            kwargs_blob: b"{}".to_vec(),
            args_compressed: true,
            kwargs_compressed: false,
            context_snapshot,
        }
    }

    #[test]
    fn blobs_are_base64_in_the_body() {
        let body = sample().to_bytes().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(r#""args_blob":"AAEC/w==""#));
        assert!(text.contains(r#""callable_reference":"reports::jobs::build""#));
    }

    #[test]
    fn decodes_what_it_encodes() {
        let msg = sample();
        let back = JobMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn missing_optional_fields_take_defaults() {
        let back = JobMessage::from_bytes(br#"{"callable_reference":"a::b"}"#).unwrap();
        assert!(back.args_blob.is_empty());
        assert!(!back.kwargs_compressed);
        assert!(back.context_snapshot.is_empty());
    }

    #[test]
    fn garbage_body_is_rejected() {
        assert!(JobMessage::from_bytes(b"\x80\x04not json").is_err());
    }
}
