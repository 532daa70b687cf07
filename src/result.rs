use crate::{Graph, ResultMemory};

/// What a finished job hands back: the result graph and the frozen memory.
#[derive(Debug, Clone)]
pub struct ComputerResult {
    graph: Graph,
    memory: ResultMemory,
}

impl ComputerResult {
    pub(crate) fn new(graph: Graph, memory: ResultMemory) -> Self {
        ComputerResult { graph, memory }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn memory(&self) -> &ResultMemory {
        &self.memory
    }

    pub fn into_parts(self) -> (Graph, ResultMemory) {
        (self.graph, self.memory)
    }
}
