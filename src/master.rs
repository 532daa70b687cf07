use crate::channel::Channel;
use crate::computer::JobState;
use crate::state::ProgramState;
use crate::worker::{Worker, WorkerReport};
use crate::{Error, Memory, Partitioner, Result, StarVertex, SuperstepStats, VertexProgram};

use tracing::{debug, error, info, warn};

use std::thread;
use std::time::Instant;

/// Drives one vertex program over a partitioned graph, superstep by
/// superstep, with a barrier between consecutive supersteps.
pub(crate) struct Master<'a, P: VertexProgram> {
    program: &'a P,
    workers: Vec<Worker<P::Message>>,
    state: ProgramState,
    max_supersteps: u64,
    job: &'a JobState,
}

impl<'a, P: VertexProgram> Master<'a, P> {
    pub fn new(
        program: &'a P,
        partitions: Vec<Vec<StarVertex>>,
        max_supersteps: u64,
        job: &'a JobState,
    ) -> Self {
        let partitioner = Partitioner::new(partitions.len());
        let channels = Channel::create(partitioner);
        let workers = partitions
            .into_iter()
            .zip(channels)
            .enumerate()
            .map(|(id, (vertices, channel))| Worker::new(id, vertices, channel))
            .collect();

        Master {
            program,
            workers,
            state: ProgramState::Uninitialized,
            max_supersteps,
            job,
        }
    }

    fn update_state(&mut self, next: ProgramState) -> Result<()> {
        let next = self.state.transition(next)?;
        if next != self.state {
            debug!("Program {} is now {}", self.program.name(), next);
        }
        self.state = next;
        Ok(())
    }

    fn print_stats(&self, stats: &SuperstepStats, reports: &[WorkerReport]) {
        info!(
            "Superstep: {}, num_vertices: {}, num_edges: {}, active: {}, messages: {}",
            stats.superstep, stats.vertices, stats.edges, stats.active_vertices, stats.messages_sent
        );

        for (worker, report) in reports.iter().enumerate() {
            debug!(
                "    worker: {}, n_active_vertices: {}, n_vertices: {}, n_edges: {}, \
                    msg_sent: {}, msg_recv: {}, msg_dropped: {}, time_cost: {} ms",
                worker,
                report.n_active_vertices,
                report.n_vertices,
                report.n_edges,
                report.n_msg_sent,
                report.n_msg_recv,
                report.n_msg_dropped,
                report.time_cost
            );
        }
    }

    /// Runs every worker for one superstep and waits for all of them.
    fn superstep(&mut self, superstep: u64, memory: &Memory) -> Result<Vec<WorkerReport>> {
        let program = self.program;
        let outcomes: Vec<Result<WorkerReport>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .workers
                .iter_mut()
                .map(|worker| {
                    let id = worker.id;
                    (id, s.spawn(move || worker.run(superstep, program, memory)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(Error::panicked(id, superstep, panic)),
                })
                .collect()
        });

        outcomes.into_iter().collect()
    }

    /// Runs the program to termination and hands back the final partitions.
    pub fn run(mut self, memory: &mut Memory) -> Result<Vec<Vec<StarVertex>>> {
        let now = Instant::now();

        self.update_state(ProgramState::Setup)?;
        self.program.setup(memory)?;
        self.update_state(ProgramState::Executing)?;

        let mut superstep = 0_u64;
        loop {
            if self.job.is_cancelled() {
                info!("Program {} cancelled before superstep {}", self.program.name(), superstep);
                return Err(Error::Cancelled);
            }

            let reports = self.superstep(superstep, memory).map_err(|e| {
                error!("Superstep {} failed: {}", superstep, e);
                e
            })?;

            let mut stats = SuperstepStats {
                superstep,
                ..SuperstepStats::default()
            };
            for report in &reports {
                stats.vertices += report.n_vertices;
                stats.edges += report.n_edges;
                stats.active_vertices += report.n_active_vertices;
                stats.messages_sent += report.n_msg_sent;
            }
            self.print_stats(&stats, &reports);

            // Contributions are folded in partition order, one writer at a time.
            for (partition, report) in reports.into_iter().enumerate() {
                memory.merge(report.delta).map_err(|e| Error::PartitionFailure {
                    partition,
                    superstep,
                    reason: e.to_string(),
                })?;
            }
            memory.complete_superstep(stats);
            self.update_state(ProgramState::Executing)?;

            if self.program.terminate(memory) {
                memory.mark_converged();
                break;
            }

            superstep += 1;
            if superstep >= self.max_supersteps {
                warn!(
                    "Program {} did not converge within {} supersteps",
                    self.program.name(),
                    self.max_supersteps
                );
                break;
            }
        }

        self.update_state(ProgramState::Terminated)?;
        info!(
            "Program {} terminated after {} supersteps, total time cost: {} ms",
            self.program.name(),
            memory.iteration(),
            now.elapsed().as_millis()
        );

        Ok(self.workers.into_iter().map(Worker::into_vertices).collect())
    }
}
