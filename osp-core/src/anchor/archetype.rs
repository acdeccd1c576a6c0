//! Archetype payloads: the user-declared fields carried by an anchor.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Which family of graph entity an archetype belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchetypeKind {
    Node,
    Edge,
    Walker,
}

impl ArchetypeKind {
    /// Name of the built-in base type for this kind.
    pub fn base_type(&self) -> &'static str {
        match self {
            Self::Node => NODE,
            Self::Edge => EDGE,
            Self::Walker => WALKER,
        }
    }
}

impl std::fmt::Display for ArchetypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Edge => write!(f, "edge"),
            Self::Walker => write!(f, "walker"),
        }
    }
}

/// Built-in base node type.
pub const NODE: &str = "Node";
/// Built-in base edge type.
pub const EDGE: &str = "Edge";
/// Built-in base walker type.
pub const WALKER: &str = "Walker";
/// Built-in root node type.
pub const ROOT: &str = "Root";

/// Dynamic payload of an anchor: its archetype name plus declared fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Archetype class name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Declared field values
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Payload {
    /// Create an empty payload of the given archetype.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Map::new(),
        }
    }

    /// Add a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value, returning the previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }
}

/// A statically typed archetype.
///
/// Usually derived with `#[derive(Archetype)]` together with serde's
/// `Serialize`/`Deserialize`.
pub trait Archetype: Serialize + DeserializeOwned {
    /// Archetype class name, used as the dispatch key.
    const NAME: &'static str;
    /// Entity family.
    const KIND: ArchetypeKind;
    /// Declared parent archetype; `None` means the kind's base type.
    const PARENT: Option<&'static str> = None;

    /// Convert into a dynamic payload.
    fn to_payload(&self) -> Result<Payload> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(Payload {
                type_name: Self::NAME.to_string(),
                fields,
            }),
            Value::Null => Ok(Payload::new(Self::NAME)),
            other => Err(Error::Internal(format!(
                "archetype {} must serialize to an object, got {}",
                Self::NAME,
                other
            ))),
        }
    }

    /// Rebuild from a dynamic payload of exactly this archetype.
    fn from_payload(payload: &Payload) -> Result<Self> {
        if payload.type_name != Self::NAME {
            return Err(Error::invalid_archetype(Self::NAME, &payload.type_name));
        }
        match serde_json::from_value(Value::Object(payload.fields.clone())) {
            Ok(value) => Ok(value),
            // Unit structs deserialize from null, not from an empty map
            Err(_) if payload.fields.is_empty() => Ok(serde_json::from_value(Value::Null)?),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct City {
        name: String,
        population: u64,
    }

    impl Archetype for City {
        const NAME: &'static str = "City";
        const KIND: ArchetypeKind = ArchetypeKind::Node;
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Marker;

    impl Archetype for Marker {
        const NAME: &'static str = "Marker";
        const KIND: ArchetypeKind = ArchetypeKind::Walker;
    }

    #[test]
    fn test_payload_conversion() {
        let city = City {
            name: "Oslo".into(),
            population: 700_000,
        };
        let payload = city.to_payload().unwrap();

        assert_eq!(payload.type_name, "City");
        assert_eq!(payload.get("name"), Some(&json!("Oslo")));
        assert_eq!(City::from_payload(&payload).unwrap(), city);
    }

    #[test]
    fn test_unit_archetype() {
        let payload = Marker.to_payload().unwrap();
        assert!(payload.fields.is_empty());
        assert_eq!(Marker::from_payload(&payload).unwrap(), Marker);
    }

    #[test]
    fn test_from_payload_rejects_other_type() {
        let payload = Payload::new("Town").with_field("name", "x");
        let err = City::from_payload(&payload).unwrap_err();
        assert!(matches!(err, Error::InvalidArchetype { .. }));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize, crate::Archetype)]
    #[archetype(node, parent = "Place")]
    struct Harbour {
        depth: f64,
    }

    #[derive(Debug, Serialize, Deserialize, crate::Archetype)]
    #[archetype(walker, name = "Census")]
    struct CensusWalker {
        total: u64,
    }

    #[test]
    fn test_derived_archetype() {
        assert_eq!(Harbour::NAME, "Harbour");
        assert_eq!(Harbour::KIND, ArchetypeKind::Node);
        assert_eq!(Harbour::PARENT, Some("Place"));

        assert_eq!(CensusWalker::NAME, "Census");
        assert_eq!(CensusWalker::PARENT, None);
        let payload = CensusWalker { total: 3 }.to_payload().unwrap();
        assert_eq!(payload.type_name, "Census");
        assert_eq!(payload.get("total"), Some(&json!(3)));
    }
}
