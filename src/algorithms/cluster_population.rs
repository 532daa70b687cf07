use super::CLUSTER;
use crate::{Emitter, MapReduce, StarVertex, Value};

pub const CLUSTER_POPULATION: &str = "clusterPopulation";

/// Number of vertices in each cluster, stored as a map from cluster id to
/// size.
#[derive(Debug, Clone)]
pub struct ClusterPopulationMapReduce {
    property: String,
    memory_key: String,
}

impl Default for ClusterPopulationMapReduce {
    fn default() -> Self {
        ClusterPopulationMapReduce {
            property: CLUSTER.to_string(),
            memory_key: CLUSTER_POPULATION.to_string(),
        }
    }
}

impl ClusterPopulationMapReduce {
    pub fn new() -> Self {
        ClusterPopulationMapReduce::default()
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

impl MapReduce for ClusterPopulationMapReduce {
    type Key = i64;
    type Value = i64;

    fn memory_key(&self) -> &str {
        &self.memory_key
    }

    fn map(&self, vertex: &StarVertex, emitter: &mut Emitter<i64, i64>) {
        if let Some(cluster) = vertex.property(&self.property).and_then(|v| v.get::<i64>()) {
            emitter.emit(cluster, 1);
        }
    }

    fn does_combine(&self) -> bool {
        true
    }

    fn combine(&self, _key: &i64, values: Vec<i64>) -> Vec<i64> {
        vec![values.into_iter().sum()]
    }

    fn reduce(&self, _key: &i64, values: Vec<i64>) -> i64 {
        values.into_iter().sum()
    }

    fn generate_final_result(&self, pairs: Vec<(i64, i64)>) -> Value {
        Value::Map(
            pairs
                .into_iter()
                .map(|(cluster, size)| (cluster.to_string(), Value::Int(size)))
                .collect(),
        )
    }
}
