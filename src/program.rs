use crate::{Combine, Memory, MemoryComputeKey, Result, Vertex, WorkerMemory};

use serde::{Deserialize, Serialize};

/// Which graph a computation hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultGraph {
    /// The input graph, untouched.
    Original,
    /// The graph as the program left it.
    New,
}

/// How much of the computed graph is kept and written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persist {
    Nothing,
    VertexProperties,
    Edges,
}

/// A vertex property a program writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexComputeKey {
    pub key: String,
    /// Transient properties are scratch state and are stripped from the
    /// result graph.
    pub transient: bool,
}

impl VertexComputeKey {
    pub fn new(key: impl Into<String>) -> Self {
        VertexComputeKey {
            key: key.into(),
            transient: false,
        }
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// A vertex-centric computation.
///
/// The engine calls [`setup`](VertexProgram::setup) once, then runs
/// supersteps. In every superstep each vertex gets one call to
/// [`execute`](VertexProgram::execute) with the messages sent to it during
/// the previous superstep; after the barrier the engine asks
/// [`terminate`](VertexProgram::terminate) whether to stop.
///
/// During superstep `s`, [`Vertex::superstep`] and
/// [`WorkerMemory::iteration`] are `s`. When `terminate` runs after superstep
/// `s`, [`Memory::iteration`] is `s + 1`, the number of completed supersteps.
pub trait VertexProgram: Send + Sync {
    type Message: Clone + Send + 'static;

    fn name(&self) -> &str;

    fn memory_compute_keys(&self) -> Vec<MemoryComputeKey> {
        Vec::new()
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        Vec::new()
    }

    fn combiner(&self) -> Option<&dyn Combine<Self::Message>> {
        None
    }

    fn preferred_result_graph(&self) -> ResultGraph {
        ResultGraph::New
    }

    fn preferred_persist(&self) -> Persist {
        Persist::VertexProperties
    }

    fn setup(&self, _memory: &mut Memory) -> Result<()> {
        Ok(())
    }

    fn execute(&self, vertex: &mut Vertex<Self::Message>, memory: &mut WorkerMemory<'_>) -> Result<()>;

    fn terminate(&self, memory: &mut Memory) -> bool;
}
