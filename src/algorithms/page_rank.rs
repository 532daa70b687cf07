use crate::{
    Combine, Memory, Persist, Result, ResultGraph, SumCombiner, Vertex, VertexComputeKey, VertexProgram, WorkerMemory,
};

pub const PAGE_RANK: &str = "pageRank";

/// Damped PageRank over out edges, run for a fixed number of supersteps.
/// Every vertex starts with rank 1.0.
#[derive(Debug, Clone)]
pub struct PageRankVertexProgram {
    alpha: f64,
    iterations: u64,
}

impl Default for PageRankVertexProgram {
    fn default() -> Self {
        PageRankVertexProgram {
            alpha: 0.85,
            iterations: 30,
        }
    }
}

impl PageRankVertexProgram {
    pub fn new() -> Self {
        PageRankVertexProgram::default()
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }
}

impl VertexProgram for PageRankVertexProgram {
    type Message = f64;

    fn name(&self) -> &str {
        "page-rank"
    }

    fn vertex_compute_keys(&self) -> Vec<VertexComputeKey> {
        vec![VertexComputeKey::new(PAGE_RANK)]
    }

    fn combiner(&self) -> Option<&dyn Combine<f64>> {
        Some(&SumCombiner)
    }

    fn preferred_result_graph(&self) -> ResultGraph {
        ResultGraph::New
    }

    fn preferred_persist(&self) -> Persist {
        Persist::VertexProperties
    }

    fn execute(&self, vertex: &mut Vertex<f64>, memory: &mut WorkerMemory<'_>) -> Result<()> {
        let rank = if memory.is_initial_iteration() {
            1.0
        } else {
            let sum: f64 = vertex.take_messages().into_iter().sum();
            (1.0 - self.alpha) + self.alpha * sum
        };
        vertex.set_property(PAGE_RANK, rank);

        let n = vertex.out_degree();
        if n > 0 {
            vertex.send_message(rank / n as f64);
        }
        Ok(())
    }

    fn terminate(&self, memory: &mut Memory) -> bool {
        memory.iteration() >= self.iterations
    }
}
