use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A collection instrument (survey schema) as stored in CIR.
///
/// The document is opaque to the proxy apart from `validator_version`. Keys keep
/// their original order so an instrument that is passed through unchanged
/// serializes back to the same JSON it was parsed from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(Map<String, Value>);

impl Instrument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Instrument(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// The validator version the instrument was written against.
    ///
    /// Empty values count as missing: null, `false`, zero, and empty strings,
    /// arrays or objects. Any other non-string value is returned in its JSON
    /// form so that version parsing can reject it with a useful message.
    pub fn validator_version(&self) -> Option<String> {
        match self.0.get("validator_version")? {
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            Value::String(s) if s.is_empty() => None,
            Value::Array(a) if a.is_empty() => None,
            Value::Object(o) if o.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Instrument {
    fn from(fields: Map<String, Value>) -> Self {
        Instrument(fields)
    }
}

/// Field descriptors for an instrument, in the order CIR returns them.
pub type InstrumentMetadata = Vec<Map<String, Value>>;

/// Body sent to the converter service.
#[derive(Debug, Serialize)]
pub struct ConversionRequest<'a> {
    pub instrument: &'a Instrument,
}

/// Query parameters sent to the converter service.
#[derive(Debug, Serialize)]
pub struct ConversionParams<'a> {
    pub current_version: &'a str,
    pub target_version: &'a str,
}
