use crate::{Error, Result, Value};

use serde::{Deserialize, Serialize};

use std::collections::btree_map::{self, BTreeMap};

pub type Properties = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: i64,
    pub target: i64,
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Edge {
    pub fn new(source: i64, target: i64, label: impl Into<String>) -> Self {
        Edge {
            source,
            target,
            label: label.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A vertex together with its outgoing edges, the unit graphs are stored in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarVertex {
    pub id: i64,
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub out_edges: Vec<Edge>,
}

impl StarVertex {
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        StarVertex {
            id,
            label: label.into(),
            properties: Properties::new(),
            out_edges: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    vertices: BTreeMap<i64, StarVertex>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Inserts a vertex, replacing any previous vertex with the same id.
    pub fn add_vertex(&mut self, vertex: StarVertex) -> &mut Self {
        self.vertices.insert(vertex.id, vertex);
        self
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<&mut Self> {
        if !self.vertices.contains_key(&edge.target) {
            return Err(Error::NotFound {
                location: format!("vertex {}", edge.target),
            });
        }

        match self.vertices.get_mut(&edge.source) {
            Some(vertex) => vertex.out_edges.push(edge),
            None => {
                return Err(Error::NotFound {
                    location: format!("vertex {}", edge.source),
                })
            }
        }

        Ok(self)
    }

    pub fn vertex(&self, id: i64) -> Option<&StarVertex> {
        self.vertices.get(&id)
    }

    pub fn vertices(&self) -> btree_map::Values<i64, StarVertex> {
        self.vertices.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.vertices.values().flat_map(|v| v.out_edges.iter())
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.vertices.values().map(|v| v.out_edges.len()).sum()
    }

    /// Values of `key` over all vertices that carry it.
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.vertices.values().filter_map(move |v| v.properties.get(key))
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

impl FromIterator<StarVertex> for Graph {
    fn from_iter<I: IntoIterator<Item = StarVertex>>(iter: I) -> Self {
        let mut graph = Graph::new();
        for vertex in iter {
            graph.add_vertex(vertex);
        }
        graph
    }
}

impl IntoIterator for Graph {
    type Item = StarVertex;
    type IntoIter = btree_map::IntoValues<i64, StarVertex>;

    fn into_iter(self) -> Self::IntoIter {
        self.vertices.into_values()
    }
}

/// The six-vertex "modern" toy graph.
pub fn modern_graph() -> Graph {
    let edges = [
        (1, 2, "knows", 0.5),
        (1, 4, "knows", 1.0),
        (1, 3, "created", 0.4),
        (4, 5, "created", 1.0),
        (4, 3, "created", 0.4),
        (6, 3, "created", 0.2),
    ];
    let vertices = [
        StarVertex::new(1, "person").with_property("name", "marko").with_property("age", 29),
        StarVertex::new(2, "person").with_property("name", "vadas").with_property("age", 27),
        StarVertex::new(3, "software").with_property("name", "lop").with_property("lang", "java"),
        StarVertex::new(4, "person").with_property("name", "josh").with_property("age", 32),
        StarVertex::new(5, "software").with_property("name", "ripple").with_property("lang", "java"),
        StarVertex::new(6, "person").with_property("name", "peter").with_property("age", 35),
    ];

    vertices
        .into_iter()
        .map(|mut vertex| {
            for &(source, target, label, weight) in edges.iter().filter(|edge| edge.0 == vertex.id) {
                vertex
                    .out_edges
                    .push(Edge::new(source, target, label).with_property("weight", weight));
            }
            vertex
        })
        .collect()
}
