//! Parser module for depth-stream messages
//!
//! Prices and quantities stay in their canonical string form end to end: the
//! feed's string is the price-level key inside the book, so `"12.30"` and
//! `"12.3"` must remain distinct.

use serde::{Deserialize, Deserializer};

/// A raw (price, qty) pair exactly as the feed sent it
pub type RawLevel = (String, String);

/// Incremental depth update from the WebSocket stream
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepthDelta {
    /// Event type
    #[serde(rename = "e", default)]
    pub event_type: String,

    /// Event time (milliseconds)
    #[serde(rename = "E", default)]
    pub event_time: u64,

    /// Symbol
    #[serde(rename = "s", default)]
    pub symbol: String,

    /// First update ID in event
    #[serde(rename = "U", default)]
    pub first_update_id: u64,

    /// Final update ID in event
    #[serde(rename = "u", default)]
    pub last_update_id: u64,

    /// Bids to update
    #[serde(rename = "b", deserialize_with = "deserialize_levels", default)]
    pub bids: Vec<RawLevel>,

    /// Asks to update
    #[serde(rename = "a", deserialize_with = "deserialize_levels", default)]
    pub asks: Vec<RawLevel>,
}

impl DepthDelta {
    /// True when the delta carries no entries on either side
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Depth snapshot from the REST API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepthSnapshot {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    /// Bids
    #[serde(deserialize_with = "deserialize_levels")]
    pub bids: Vec<RawLevel>,

    /// Asks
    #[serde(deserialize_with = "deserialize_levels")]
    pub asks: Vec<RawLevel>,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Depth(DepthDelta),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        if let Ok(delta) = serde_json::from_str::<DepthDelta>(raw) {
            if delta.event_type == "depthUpdate" {
                return Ok(ParsedMessage::Depth(delta));
            }
        }

        Ok(ParsedMessage::Unknown(raw.to_string()))
    }
}

/// Custom deserializer for levels from arrays of string pairs
///
/// Entries with fewer than two elements are dropped rather than failing the
/// whole message.
fn deserialize_levels<'de, D>(deserializer: D) -> Result<Vec<RawLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|mut pair| {
            if pair.len() < 2 {
                return None;
            }
            let qty = pair.swap_remove(1);
            let price = pair.swap_remove(0);
            Some((price, qty))
        })
        .collect())
}
