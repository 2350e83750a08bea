//! Partition record codec
//!
//! A worker's input is a stream of key/value records delivered by the batch
//! dispatcher. The key pins every record in the partition to one index and
//! one routing hint; the value carries one document. Both sides use a
//! literal `|` separator:
//!
//! - key: `<indexName>|<routingHint>`
//! - value: `<docType>|<docId>|<rawJson>`
//!
//! The JSON tail is taken by byte offset from the original string, never by
//! re-joining split pieces, so pipes inside the document body survive. Only
//! the `<docType>|<docId>` prefix must be pipe-free.

use crate::error::{Error, Result};

/// Separator between fields of a partition record key or value.
pub const TUPLE_SEPARATOR: char = '|';

/// Parsed partition key: which index this partition feeds and the routing
/// hint shared by every record in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingKey {
    /// Target index name
    pub index_name: String,
    /// Routing hint the engine hashes to pick the shard
    pub routing_hint: String,
}

impl RoutingKey {
    /// Parse a `<indexName>|<routingHint>` key.
    pub fn parse(raw: &str) -> Result<Self> {
        let (index_name, routing_hint) = raw
            .split_once(TUPLE_SEPARATOR)
            .ok_or_else(|| Error::invalid_record(format!("missing '|' in key: {raw}")))?;
        if index_name.is_empty() || routing_hint.is_empty() {
            return Err(Error::invalid_record(format!("empty field in key: {raw}")));
        }
        Ok(Self {
            index_name: index_name.to_string(),
            routing_hint: routing_hint.to_string(),
        })
    }

    /// Encode back to the wire form.
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.index_name, TUPLE_SEPARATOR, self.routing_hint)
    }
}

/// Parsed document payload, borrowing from the raw record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentPayload<'a> {
    /// Document type (mapping name)
    pub doc_type: &'a str,
    /// Document id
    pub doc_id: &'a str,
    /// Raw JSON body, opaque to the core
    pub json: &'a str,
}

impl<'a> DocumentPayload<'a> {
    /// Parse a `<docType>|<docId>|<rawJson>` value.
    pub fn parse(raw: &'a str) -> Result<Self> {
        let (doc_type, rest) = raw
            .split_once(TUPLE_SEPARATOR)
            .ok_or_else(|| Error::invalid_record(format!("missing doc type in payload: {raw}")))?;
        let (doc_id, json) = rest
            .split_once(TUPLE_SEPARATOR)
            .ok_or_else(|| Error::invalid_record(format!("missing doc id in payload: {raw}")))?;
        if doc_type.is_empty() || doc_id.is_empty() {
            return Err(Error::invalid_record(format!(
                "empty field in payload: {raw}"
            )));
        }
        Ok(Self {
            doc_type,
            doc_id,
            json,
        })
    }
}

/// Encode a document payload to the wire form.
pub fn encode_payload(doc_type: &str, doc_id: &str, json: &str) -> String {
    format!("{doc_type}{TUPLE_SEPARATOR}{doc_id}{TUPLE_SEPARATOR}{json}")
}
