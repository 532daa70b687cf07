use super::CLUSTER;
use crate::{Emitter, MapReduce, StarVertex, Value};

use std::collections::BTreeSet;

pub const CLUSTER_COUNT: &str = "clusterCount";

/// Counts the distinct values of the cluster property.
#[derive(Debug, Clone)]
pub struct ClusterCountMapReduce {
    property: String,
    memory_key: String,
}

impl Default for ClusterCountMapReduce {
    fn default() -> Self {
        ClusterCountMapReduce {
            property: CLUSTER.to_string(),
            memory_key: CLUSTER_COUNT.to_string(),
        }
    }
}

impl ClusterCountMapReduce {
    pub fn new() -> Self {
        ClusterCountMapReduce::default()
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    /// Memory key the result is stored under.
    pub fn store_as(mut self, memory_key: impl Into<String>) -> Self {
        self.memory_key = memory_key.into();
        self
    }
}

impl MapReduce for ClusterCountMapReduce {
    type Key = ();
    type Value = BTreeSet<i64>;

    fn memory_key(&self) -> &str {
        &self.memory_key
    }

    fn map(&self, vertex: &StarVertex, emitter: &mut Emitter<(), BTreeSet<i64>>) {
        if let Some(cluster) = vertex.property(&self.property).and_then(|v| v.get::<i64>()) {
            emitter.emit((), BTreeSet::from([cluster]));
        }
    }

    fn does_combine(&self) -> bool {
        true
    }

    fn combine(&self, key: &(), values: Vec<BTreeSet<i64>>) -> Vec<BTreeSet<i64>> {
        vec![self.reduce(key, values)]
    }

    fn reduce(&self, _key: &(), values: Vec<BTreeSet<i64>>) -> BTreeSet<i64> {
        values.into_iter().flatten().collect()
    }

    fn generate_final_result(&self, pairs: Vec<((), BTreeSet<i64>)>) -> Value {
        let clusters: BTreeSet<i64> = pairs.into_iter().flat_map(|(_, set)| set).collect();
        Value::Int(clusters.len() as i64)
    }
}
