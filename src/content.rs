//! Opaque structured message content and its persisted encoding.
//!
//! A message is a JSON object of protocol fields plus an optional raw binary
//! payload. The payload is kept outside the document while the message lives
//! in memory; the persisted form folds it into the document as a hex string
//! guarded by a crc32 checksum, so the on-disk record stays a single compact
//! JSON value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

const MSG_ID_FIELD: &str = "msg_id";
const PAYLOAD_HEX_FIELD: &str = "payload_hex";
const PAYLOAD_CRC_FIELD: &str = "payload_crc";

/// Owned, opaque message content.
///
/// `Queue::append` takes this by value; `Queue::get_content` hands back a
/// shared borrow that stays valid until the message is unloaded.
#[derive(Clone, Debug, PartialEq)]
pub struct Content {
    doc: Map<String, Value>,
    payload: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
struct StoredContent {
    #[serde(flatten)]
    doc: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_crc: Option<u32>,
}

impl Content {
    pub fn new(doc: Map<String, Value>) -> Self {
        Self { doc, payload: None }
    }

    /// Build content from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidContent`: the value is not an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(doc) => Ok(Self::new(doc)),
            _ => Err(Error::InvalidContent("content must be a JSON object")),
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn doc(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Protocol message id, read from the document. 0 when absent.
    pub fn msg_id(&self) -> u32 {
        self.doc
            .get(MSG_ID_FIELD)
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
    }

    /// Serialize to the compact persisted form.
    ///
    /// The live value is left untouched; the payload travels inside the
    /// document only on disk.
    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let stored = StoredContent {
            doc: self.doc.clone(),
            payload_hex: self.payload.as_deref().map(hex_encode),
            payload_crc: self.payload.as_deref().map(crc32),
        };
        Ok(serde_json::to_vec(&stored)?)
    }

    /// Parse the persisted form back into live content, restoring the
    /// binary payload from its hex encoding.
    ///
    /// # Errors
    ///
    /// - `Error::Encode`: malformed JSON.
    /// - `Error::Corrupt`: bad hex or checksum mismatch.
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self> {
        let stored: StoredContent = serde_json::from_slice(bytes)?;
        let mut doc = stored.doc;
        // Tolerate stores that hand the folded fields back inside the doc.
        doc.remove(PAYLOAD_HEX_FIELD);
        doc.remove(PAYLOAD_CRC_FIELD);

        let payload = match stored.payload_hex {
            Some(hex) => {
                let raw = hex_decode(&hex)?;
                if let Some(expected) = stored.payload_crc {
                    if crc32(&raw) != expected {
                        return Err(Error::Corrupt("payload checksum mismatch"));
                    }
                }
                Some(raw)
            }
            None => None,
        };

        Ok(Self { doc, payload })
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn hex_decode(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::Corrupt("odd-length payload hex"));
    }
    let bytes = hex.as_bytes();
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let hi = hex_nibble(pair[0])?;
        let lo = hex_nibble(pair[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_nibble(ch: u8) -> Result<u8> {
    match ch {
        b'0'..=b'9' => Ok(ch - b'0'),
        b'a'..=b'f' => Ok(ch - b'a' + 10),
        b'A'..=b'F' => Ok(ch - b'A' + 10),
        _ => Err(Error::Corrupt("invalid payload hex digit")),
    }
}
