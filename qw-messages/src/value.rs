use std::collections::BTreeMap;

use serde_derive::Deserialize;
use serde_derive::Serialize;

/// A dynamically-typed argument or result value.
///
/// This stands in for the source implementation's pickled Python objects
/// (see spec.md REDESIGN FLAGS: "Dynamic callable transport"). Only a
/// closed set of shapes is representable; anything else must be coerced
/// to [`ArgValue::Repr`] by the producer before it reaches the wire.
///
/// `Map` uses a `BTreeMap` rather than a `HashMap` so that encoding the
/// same logical value twice always yields the same bytes (spec.md §4.A
/// determinism requirement).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<ArgValue>),
    Map(BTreeMap<String, ArgValue>),
    /// Best-effort textual representation of a value the codec could not
    /// otherwise encode (e.g. a streaming/lazy sequence). Spec.md §4.A
    /// edge case.
    Repr(String),
}

impl ArgValue {
    pub fn str(s: impl Into<String>) -> Self {
        ArgValue::Str(s.into())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}
