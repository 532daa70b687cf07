use crate::{Graph, StarVertex};

/// Assigns every vertex to exactly one partition by its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    partitions: usize,
}

impl Partitioner {
    /// `partitions` must be positive; job validation rejects zero workers
    /// before a partitioner is built.
    pub fn new(partitions: usize) -> Self {
        Partitioner {
            partitions: partitions.max(1),
        }
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn partition_of(&self, id: i64) -> usize {
        id.rem_euclid(self.partitions as i64) as usize
    }

    pub fn split(&self, graph: Graph) -> Vec<Vec<StarVertex>> {
        let mut parts: Vec<Vec<StarVertex>> = (0..self.partitions).map(|_| Vec::new()).collect();
        for vertex in graph {
            parts[self.partition_of(vertex.id)].push(vertex);
        }
        parts
    }
}
