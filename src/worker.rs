use crate::channel::Channel;
use crate::memory::MemoryDelta;
use crate::message::Message;
use crate::{Combine, Error, Memory, Result, StarVertex, Vertex, VertexProgram, WorkerMemory};

use tracing::{debug, warn};

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// What one worker did in one superstep.
#[derive(Debug, Default)]
pub(crate) struct WorkerReport {
    pub delta: MemoryDelta,
    pub n_vertices: usize,
    pub n_edges: usize,
    pub n_active_vertices: usize,
    pub n_msg_sent: usize,
    pub n_msg_recv: usize,
    pub n_msg_dropped: usize,
    pub time_cost: u128,
}

/// The vertices of one partition with their pending outgoing messages.
struct Partition<M> {
    vertices: BTreeMap<i64, Vertex<M>>,
    send_queues: HashMap<i64, Vec<Message<M>>>,
}

impl<M: Clone + Send + 'static> Partition<M> {
    fn compute<P>(&mut self, superstep: u64, program: &P, memory: &Memory) -> Result<(MemoryDelta, usize)>
    where
        P: VertexProgram<Message = M>,
    {
        let combiner = program.combiner();
        let mut worker_memory = WorkerMemory::new(memory);
        let mut n_active_vertices = 0;

        for vertex in self.vertices.values_mut() {
            vertex.begin_superstep(superstep);
            program.execute(vertex, &mut worker_memory)?;

            // Collect vertex's pending messages for later sending.
            for mut message in vertex.send_queue.drain(..) {
                let queue = self.send_queues.entry(message.receiver).or_default();
                if let Some(combiner) = combiner {
                    if let Some(initial) = queue.pop() {
                        message.value = combiner.combine(initial.value, message.value);
                    }
                }
                queue.push(message);
            }

            if vertex.active() {
                n_active_vertices += 1;
            }
        }

        Ok((worker_memory.into_delta(), n_active_vertices))
    }

    fn send_messages(&mut self, channel: &Channel<M>) -> usize {
        let mut n_msg_sent = 0;
        for (_, send_queue) in self.send_queues.drain() {
            for message in send_queue {
                if channel.send(message) {
                    n_msg_sent += 1;
                }
            }
        }
        n_msg_sent
    }

    fn receive_messages(&mut self, channel: &Channel<M>, combiner: Option<&dyn Combine<M>>) -> (usize, usize) {
        let mut n_msg_recv = 0;
        let mut n_msg_dropped = 0;
        for message in channel {
            match self.vertices.get_mut(&message.receiver) {
                Some(vertex) => {
                    vertex.receive(message.into_value(), combiner);
                    n_msg_recv += 1;
                }
                None => {
                    debug!(
                        "No vertex {} here, dropping message from {}",
                        message.receiver(),
                        message.sender()
                    );
                    n_msg_dropped += 1;
                }
            }
        }
        (n_msg_recv, n_msg_dropped)
    }
}

pub(crate) struct Worker<M> {
    pub id: usize,
    partition: Partition<M>,
    channel: Channel<M>,
}

impl<M: Clone + Send + 'static> Worker<M> {
    pub fn new(id: usize, vertices: Vec<StarVertex>, channel: Channel<M>) -> Self {
        Worker {
            id,
            partition: Partition {
                vertices: vertices.into_iter().map(|v| (v.id, Vertex::from(v))).collect(),
                send_queues: HashMap::new(),
            },
            channel,
        }
    }

    pub fn local_n_vertices(&self) -> usize {
        self.partition.vertices.len()
    }

    pub fn local_n_edges(&self) -> usize {
        self.partition.vertices.values().map(|v| v.out_degree()).sum()
    }

    /// Runs one superstep: compute every local vertex, flush outgoing
    /// messages, then collect what the other partitions sent until all of
    /// them are done.
    pub fn run<P>(&mut self, superstep: u64, program: &P, memory: &Memory) -> Result<WorkerReport>
    where
        P: VertexProgram<Message = M>,
    {
        let now = Instant::now();

        let done = self.channel.done_guard();
        let computed = self.partition.compute(superstep, program, memory);
        let n_msg_sent = match computed {
            Ok(_) => self.partition.send_messages(&self.channel),
            Err(_) => 0,
        };
        drop(done);

        let (n_msg_recv, n_msg_dropped) = self.partition.receive_messages(&self.channel, program.combiner());
        if n_msg_dropped > 0 {
            warn!(
                "Worker {} dropped {} messages addressed to unknown vertices",
                self.id, n_msg_dropped
            );
        }

        let (delta, n_active_vertices) = computed.map_err(|e| match e {
            Error::PartitionFailure { .. } => e,
            e => Error::PartitionFailure {
                partition: self.id,
                superstep,
                reason: e.to_string(),
            },
        })?;

        Ok(WorkerReport {
            delta,
            n_vertices: self.local_n_vertices(),
            n_edges: self.local_n_edges(),
            n_active_vertices,
            n_msg_sent,
            n_msg_recv,
            n_msg_dropped,
            time_cost: now.elapsed().as_millis(),
        })
    }

    pub fn into_vertices(self) -> Vec<StarVertex> {
        self.partition.vertices.into_values().map(StarVertex::from).collect()
    }
}
