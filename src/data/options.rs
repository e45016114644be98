//! Adjustment options supplied by the controller
//!
//! Options are an open bag of keys. Each adjustment method reads only the keys
//! it understands and falls back to documented defaults for the rest, so
//! unknown keys are kept rather than rejected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CodedError, ErrorCode};

/// String-keyed option map with typed extractors
///
/// Backed by a `BTreeMap` so the serialized form is canonical: two option sets
/// with the same entries always serialize identically, regardless of the order
/// the controller sent them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdjustmentOptions(BTreeMap<String, Value>);

impl AdjustmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the controller's `wto` string
    ///
    /// Controllers send the object body without surrounding braces
    /// (`"h":100,"t":100`), so braces are added when missing. An empty or
    /// whitespace-only string yields no options.
    ///
    /// # Returns
    /// * `Err(CodedError)` with `MalformedAdjustmentOptions` if the text is not
    ///   a JSON object
    pub fn parse(raw: &str) -> Result<Self, CodedError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let text = if trimmed.starts_with('{') {
            trimmed.to_string()
        } else {
            format!("{{{}}}", trimmed)
        };

        let map: BTreeMap<String, Value> = serde_json::from_str(&text).map_err(|e| {
            CodedError::new(
                ErrorCode::MalformedAdjustmentOptions,
                format!("Adjustment options are not a JSON object: {}", e),
            )
        })?;
        Ok(Self(map))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Reads a numeric option; numeric strings are accepted too
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
    }

    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key)?.as_str()
    }

    /// Canonical JSON used in cache fingerprints
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}
