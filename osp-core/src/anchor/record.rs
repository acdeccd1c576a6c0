//! Stored record shape shared by every persistent tier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Anchor, AnchorId};
use crate::error::Result;

/// `{ id, data, type }` as written to the cache, document store, and shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Anchor id as a string
    pub id: String,
    /// Opaque serialized anchor
    pub data: String,
    /// Archetype class name
    #[serde(rename = "type")]
    pub type_name: String,
}

impl StoredRecord {
    /// Key in the fast cache and the shelf store.
    pub fn key(&self) -> String {
        format!("{}{}", super::id::KEY_PREFIX, self.id)
    }

    /// Content digest of the serialized payload.
    pub fn digest(&self) -> String {
        content_digest(&self.data)
    }

    /// Parse the record's id.
    pub fn anchor_id(&self) -> Option<AnchorId> {
        AnchorId::parse(&self.id).ok()
    }

    /// Serialize the record for key-value tiers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a record previously produced by [`StoredRecord::to_json`].
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// SHA-256 of `content`, hex encoded.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Anchor {
    /// Serialize into the stored record shape.
    pub fn to_record(&self) -> Result<StoredRecord> {
        Ok(StoredRecord {
            id: self.id.to_string(),
            data: serde_json::to_string(self)?,
            type_name: self.archetype.type_name.clone(),
        })
    }

    /// Rebuild an anchor from a stored record.
    ///
    /// The anchor's hash is set to the record's digest, so writing it back
    /// unchanged is a no-op.
    pub fn from_record(record: &StoredRecord) -> Result<Self> {
        let mut anchor: Anchor = serde_json::from_str(&record.data)?;
        anchor.hash = Some(record.digest());
        Ok(anchor)
    }
}
