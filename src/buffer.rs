//! Buffer and metadata types.
//!
//! A [`Buffer`] is the unit of data flowing along a link: an opaque payload
//! plus an optional presentation timestamp and extensible metadata. Buffers
//! are immutable once emitted; cloning one is cheap because the payload is
//! a reference-counted [`Bytes`] slice.

use crate::clock::ClockTime;
use bytes::Bytes;

/// Possible values for extra metadata fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// Raw bytes.
    Bytes(Bytes),
}

/// Metadata associated with a buffer.
///
/// Contains a sequence number and extensible key-value fields for
/// domain-specific data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Monotonic sequence number assigned by the producer.
    pub sequence: u64,
    /// Extensible key-value fields.
    pub fields: Vec<(String, MetadataValue)>,
}

impl Metadata {
    /// Create metadata with just a sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            fields: Vec::new(),
        }
    }

    /// Look up an extra field by key.
    pub fn field(&self, key: &str) -> Option<&MetadataValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Add an extra field.
    pub fn set_field(&mut self, key: impl Into<String>, value: MetadataValue) {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }
}

/// A unit of stream data.
///
/// The core is payload-agnostic: a buffer's bytes are only interpreted by
/// the elements at either end of a link.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    payload: Bytes,
    pts: Option<ClockTime>,
    metadata: Metadata,
}

impl Buffer {
    /// Create a buffer from a payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            pts: None,
            metadata: Metadata::default(),
        }
    }

    /// Create a buffer carrying only a sequence number (useful in tests and
    /// synthetic sources).
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            payload: Bytes::new(),
            pts: None,
            metadata: Metadata::from_sequence(sequence),
        }
    }

    /// Attach a presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Get the presentation timestamp, if set.
    pub fn pts(&self) -> Option<ClockTime> {
        self.pts
    }

    /// Get the metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = Buffer::new(&b"hello"[..]).with_pts(ClockTime::from_millis(40));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.pts(), Some(ClockTime::from_millis(40)));
        assert_eq!(buffer.metadata().sequence, 0);
    }

    #[test]
    fn test_buffer_clone_shares_payload() {
        let buffer = Buffer::new(vec![0u8; 64]);
        let clone = buffer.clone();
        assert_eq!(buffer, clone);
        assert_eq!(clone.payload().as_ptr(), buffer.payload().as_ptr());
    }

    #[test]
    fn test_metadata_fields() {
        let mut meta = Metadata::from_sequence(7);
        meta.set_field("keyframe", MetadataValue::Bool(true));
        meta.set_field("keyframe", MetadataValue::Bool(false));

        assert_eq!(meta.sequence, 7);
        assert_eq!(meta.field("keyframe"), Some(&MetadataValue::Bool(false)));
        assert_eq!(meta.field("missing"), None);
        assert_eq!(meta.fields.len(), 1);
    }
}
