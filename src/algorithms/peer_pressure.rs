use crate::{
    Memory, MemoryComputeKey, Operator, Persist, Result, ResultGraph, Vertex, VertexComputeKey, VertexProgram,
    WorkerMemory,
};

use tracing::warn;

use std::collections::BTreeMap;

pub const CLUSTER: &str = "cluster";
pub const VOTE_STRENGTH: &str = "voteStrength";
const VOTE_TO_HALT: &str = "voteToHalt";

/// Label propagation: every vertex starts in its own cluster and then joins
/// the cluster with the most votes among itself and its in-neighbours. Ties
/// go to the smaller cluster id. Stops once a superstep changes no vertex, or
/// after `max_iterations` supersteps.
#[derive(Debug, Clone)]
pub struct PeerPressureVertexProgram {
    property: String,
    max_iterations: u64,
}

impl Default for PeerPressureVertexProgram {
    fn default() -> Self {
        PeerPressureVertexProgram {
            property: CLUSTER.to_string(),
            max_iterations: 30,
        }
    }
}

impl PeerPressureVertexProgram {
    pub fn new() -> Self {
        PeerPressureVertexProgram::default()
    }

    /// Vertex property the cluster id is written to.
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

fn largest_count(votes: &BTreeMap<i64, f64>) -> Option<i64> {
    let mut largest: Option<(i64, f64)> = None;
    for (&cluster, &count) in votes {
        match largest {
            Some((_, best)) if count <= best => {}
            _ => largest = Some((cluster, count)),
        }
    }
    largest.map(|(cluster, _)| cluster)
}

impl VertexProgram for PeerPressureVertexProgram {
    type Message = (i64, f64);

    fn name(&self) -> &str {
        "peer-pressure"
    }

    fn memory_compute_keys(&self) -> Vec<MemoryComputeKey> {
        vec![MemoryComputeKey::new(VOTE_TO_HALT, Operator::And).transient()]
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![
            VertexComputeKey::new(self.property.as_str()),
            VertexComputeKey::new(VOTE_STRENGTH).transient(),
        ]
    }

    fn preferred_result_graph(&self) -> ResultGraph {
        ResultGraph::New
    }

    fn preferred_persist(&self) -> Persist {
        Persist::VertexProperties
    }

    fn setup(&self, memory: &mut Memory) -> Result<()> {
        memory.set(VOTE_TO_HALT, false)
    }

    fn execute(&self, vertex: &mut Vertex<(i64, f64)>, memory: &mut WorkerMemory<'_>) -> Result<()> {
        if memory.is_initial_iteration() {
            let id = vertex.id();
            vertex.set_property(self.property.as_str(), id);
            vertex.set_property(VOTE_STRENGTH, 1.0);
            vertex.send_message((id, 1.0));
            return memory.add(VOTE_TO_HALT, false);
        }

        let current: i64 = vertex.value(&self.property)?;
        let strength: f64 = vertex.value(VOTE_STRENGTH)?;

        let mut votes = BTreeMap::new();
        votes.insert(current, strength);
        for (cluster, vote) in vertex.take_messages() {
            *votes.entry(cluster).or_insert(0.0) += vote;
        }

        let cluster = largest_count(&votes).unwrap_or(vertex.id());
        memory.add(VOTE_TO_HALT, cluster == current)?;
        vertex.set_property(self.property.as_str(), cluster);
        vertex.send_message((cluster, strength));
        Ok(())
    }

    fn terminate(&self, memory: &mut Memory) -> bool {
        let halt = memory.get::<bool>(VOTE_TO_HALT).unwrap_or(false) || memory.iteration() >= self.max_iterations;
        if halt {
            return true;
        }

        match memory.set(VOTE_TO_HALT, true) {
            Ok(_) => false,
            Err(e) => {
                warn!("Can not reset {}: {}", VOTE_TO_HALT, e);
                true
            }
        }
    }
}
