use crate::{Edge, StarVertex, Value};

use serde::{Deserialize, Serialize};

/// A single persisted unit: a vertex with its out edges, a lone edge, or a
/// memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Record {
    Vertex(StarVertex),
    Edge(Edge),
    Entry(KeyValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Vertex(_) => "vertex",
            Record::Edge(_) => "edge",
            Record::Entry(_) => "entry",
        }
    }

    pub fn as_vertex(&self) -> Option<&StarVertex> {
        match self {
            Record::Vertex(vertex) => Some(vertex),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Record::Entry(entry) => Some(&entry.key),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Record::Entry(entry) => Some(&entry.value),
            _ => None,
        }
    }

    pub fn into_entry(self) -> Option<KeyValue> {
        match self {
            Record::Entry(entry) => Some(entry),
            _ => None,
        }
    }
}
