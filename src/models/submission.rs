use bytes::Bytes;
use std::collections::HashMap;

use super::AddressFields;

/// Untyped property attributes as submitted, keyed by form field name
pub type RawFields = HashMap<String, String>;

/// One photo part of a submission
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl PhotoFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// A listing submission as received, before any validation
///
/// Transient: consumed by a single ingestion attempt.
#[derive(Debug, Clone, Default)]
pub struct RawSubmission {
    pub address: AddressFields,
    pub manager_id: String,
    pub fields: RawFields,
    pub files: Vec<PhotoFile>,
}
