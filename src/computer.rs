use crate::mapreduce::MapReducePass;
use crate::master::Master;
use crate::{
    search_location, ComputerConfig, ComputerResult, Error, Graph, Location, MapReduce, Memory, MemoryComputeKey,
    Output, Partitioner, Persist, Result, ResultGraph, StarVertex, Storage, VertexComputeKey, VertexProgram,
};

use tracing::{debug, error, info, warn};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A vertex program with its message type erased.
trait ProgramDriver: Send + Sync {
    fn program_name(&self) -> &str;

    fn declared_memory_keys(&self) -> Vec<MemoryComputeKey>;

    fn declared_vertex_keys(&self) -> Vec<VertexComputeKey>;

    fn preferences(&self) -> (ResultGraph, Persist);

    fn drive(
        &self,
        partitions: Vec<Vec<StarVertex>>,
        memory: &mut Memory,
        max_supersteps: u64,
        job: &JobState,
    ) -> Result<Vec<Vec<StarVertex>>>;
}

impl<P: VertexProgram> ProgramDriver for P {
    fn program_name(&self) -> &str {
        VertexProgram::name(self)
    }

    fn declared_memory_keys(&self) -> Vec<MemoryComputeKey> {
        self.memory_compute_keys()
    }

    fn declared_vertex_keys(&self) -> Vec<VertexComputeKey> {
        self.vertex_compute_keys()
    }

    fn preferences(&self) -> (ResultGraph, Persist) {
        (self.preferred_result_graph(), self.preferred_persist())
    }

    fn drive(
        &self,
        partitions: Vec<Vec<StarVertex>>,
        memory: &mut Memory,
        max_supersteps: u64,
        job: &JobState,
    ) -> Result<Vec<Vec<StarVertex>>> {
        Master::new(self, partitions, max_supersteps, job).run(memory)
    }
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const PUBLISHING: u8 = 2;
const FINISHED: u8 = 3;

/// Where a submitted job is, shared between its thread and its handle.
///
/// ```text
/// RUNNING ----> PUBLISHING ----> FINISHED
///    |                              ^
///    +--------> CANCELLED           |
///    +------------------------------+
/// ```
///
/// A cancel only wins while the job is still running; once publishing has
/// started the job runs to completion.
#[derive(Debug)]
pub(crate) struct JobState(AtomicU8);

impl JobState {
    fn new(state: u8) -> Self {
        JobState(AtomicU8::new(state))
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst) == CANCELLED
    }

    fn cancel(&self) -> bool {
        match self.0.compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => true,
            Err(current) => current == CANCELLED,
        }
    }

    fn begin_publishing(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, PUBLISHING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| (state != CANCELLED).then_some(FINISHED));
    }
}

/// Configures and submits one job: an optional vertex program followed by
/// any number of map-reduce passes, run over the graph found at the input
/// location and published under the output location.
pub struct GraphComputer {
    storage: Arc<dyn Storage>,
    config: ComputerConfig,
    program: Option<Box<dyn ProgramDriver>>,
    passes: Vec<Box<dyn MapReducePass>>,
}

impl GraphComputer {
    pub fn new(storage: Arc<dyn Storage>, config: ComputerConfig) -> Self {
        GraphComputer {
            storage,
            config,
            program: None,
            passes: Vec::new(),
        }
    }

    pub fn program<P: VertexProgram + 'static>(mut self, program: P) -> Self {
        self.program = Some(Box::new(program));
        self
    }

    /// Registers a pass. Passes run in registration order.
    pub fn map_reduce<M: MapReduce + 'static>(mut self, pass: M) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn result_graph(mut self, result_graph: ResultGraph) -> Self {
        self.config.result_graph = Some(result_graph);
        self
    }

    pub fn persist(mut self, persist: Persist) -> Self {
        self.config.persist = Some(persist);
        self
    }

    pub fn config(&self) -> &ComputerConfig {
        &self.config
    }

    /// Starts the job on its own thread. Configuration errors resolve the
    /// returned handle right away, before any I/O.
    pub fn submit(self) -> ComputerFuture {
        let job = match self.validate() {
            Ok(job) => job,
            Err(e) => {
                warn!("Rejected job: {}", e);
                return ComputerFuture::resolved(Err(e));
            }
        };

        let state = Arc::new(JobState::new(RUNNING));
        let (sender, receiver) = oneshot::channel();
        let shared = state.clone();

        info!(
            "Submitting job {} -> {} (program: {}, passes: {}, workers: {})",
            job.input,
            job.output,
            job.program.as_ref().map(|p| p.program_name()).unwrap_or("none"),
            job.passes.len(),
            job.workers
        );

        let spawned = thread::Builder::new()
            .name("graph-computer".to_string())
            .spawn(move || {
                let result = job.run(&shared);
                shared.finish();
                match &result {
                    Ok(_) => info!("Job finished, output at {}", job.output),
                    Err(Error::Cancelled) => info!("Job cancelled, nothing written to {}", job.output),
                    Err(e) => error!("Job failed: {}", e),
                }
                if sender.send(result).is_err() {
                    debug!("Nobody is waiting for the result of {}", job.output);
                }
            });

        match spawned {
            Ok(handle) => ComputerFuture {
                receiver,
                state,
                handle: Some(handle),
            },
            Err(e) => ComputerFuture::resolved(Err(Error::io("graph-computer thread", e))),
        }
    }

    fn validate(self) -> Result<Job> {
        let GraphComputer {
            storage,
            config,
            program,
            passes,
        } = self;

        if program.is_none() && passes.is_empty() {
            return Err(Error::configuration("neither a vertex program nor a map-reduce pass was given"));
        }
        if config.workers == 0 {
            return Err(Error::configuration("at least one worker is required"));
        }
        if config.max_supersteps == 0 {
            return Err(Error::configuration("max_supersteps must be positive"));
        }
        let input = config
            .input_location
            .clone()
            .ok_or_else(|| Error::configuration("no input location"))?;
        let output = config
            .output_location
            .clone()
            .ok_or_else(|| Error::configuration("no output location"))?;

        let memory_keys = program
            .as_ref()
            .map(|p| p.declared_memory_keys())
            .unwrap_or_default();
        let vertex_keys = program
            .as_ref()
            .map(|p| p.declared_vertex_keys())
            .unwrap_or_default();

        let mut program_keys = BTreeSet::new();
        for key in &memory_keys {
            check_memory_key(&key.key)?;
            program_keys.insert(key.key.as_str());
        }
        let mut pass_keys = BTreeSet::new();
        for pass in &passes {
            let key = pass.key();
            check_memory_key(key)?;
            if program_keys.contains(key) {
                return Err(Error::configuration(format!(
                    "map-reduce key {} is also a memory key of the vertex program",
                    key
                )));
            }
            if !pass_keys.insert(key) {
                return Err(Error::configuration(format!("map-reduce key {} is used twice", key)));
            }
        }

        let (preferred_graph, preferred_persist) = program
            .as_ref()
            .map(|p| p.preferences())
            .unwrap_or((ResultGraph::Original, Persist::Nothing));
        let result_graph = config.result_graph.unwrap_or(preferred_graph);
        let persist = config.persist.unwrap_or(preferred_persist);
        if result_graph == ResultGraph::Original && persist != Persist::Nothing {
            return Err(Error::configuration(format!(
                "the original graph can not be persisted with {:?}, storage is append-only",
                persist
            )));
        }

        Ok(Job {
            storage,
            input,
            output,
            workers: config.workers,
            max_supersteps: config.max_supersteps,
            overwrite_output: config.overwrite_output,
            result_graph,
            persist,
            program,
            passes,
            transient_vertex_keys: vertex_keys.into_iter().filter(|k| k.transient).map(|k| k.key).collect(),
            memory_keys,
        })
    }
}

/// Memory keys name directories under the output root, so they must be a
/// single visible path component that can not clash with the graph.
fn check_memory_key(key: &str) -> Result<()> {
    let reserved = key.starts_with('~') || key.starts_with('.') || key.starts_with('_');
    if key.is_empty() || reserved || key.contains(['/', '\\']) {
        return Err(Error::configuration(format!("{:?} can not be used as a memory key", key)));
    }
    Ok(())
}

/// A validated job, owned by its thread.
struct Job {
    storage: Arc<dyn Storage>,
    input: Location,
    output: Location,
    workers: usize,
    max_supersteps: u64,
    overwrite_output: bool,
    result_graph: ResultGraph,
    persist: Persist,
    program: Option<Box<dyn ProgramDriver>>,
    passes: Vec<Box<dyn MapReducePass>>,
    memory_keys: Vec<MemoryComputeKey>,
    transient_vertex_keys: Vec<String>,
}

impl Job {
    fn run(&self, state: &JobState) -> Result<ComputerResult> {
        if self.storage.exists(&self.output) && !self.overwrite_output {
            return Err(Error::configuration(format!("output {} already exists", self.output)));
        }

        let input = search_location(&self.input, self.storage.as_ref())?;
        let graph = self.storage.read_graph(&input)?;
        info!(
            "Loaded {} vertices and {} edges from {}",
            graph.vertex_count(),
            graph.edge_count(),
            input
        );

        let original = match self.result_graph {
            ResultGraph::Original => Some(graph.clone()),
            ResultGraph::New => None,
        };
        let mut partitions = Partitioner::new(self.workers).split(graph);
        let mut memory = Memory::new(self.memory_keys.clone());

        if let Some(program) = self.program.as_ref() {
            partitions = program.drive(partitions, &mut memory, self.max_supersteps, state)?;
        }

        for pass in &self.passes {
            if state.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let value = pass.execute(&partitions, memory.iteration())?;
            info!("Map-reduce pass {} finished", pass.key());
            memory.set_result(pass.key(), value);
        }

        for vertex in partitions.iter_mut().flatten() {
            for key in &self.transient_vertex_keys {
                vertex.properties.remove(key);
            }
        }

        let (graph, persisted) = match (self.result_graph, self.persist) {
            (ResultGraph::Original, _) => (original.unwrap_or_default(), None),
            (ResultGraph::New, Persist::Nothing) => (Graph::new(), None),
            (ResultGraph::New, Persist::VertexProperties) => {
                for vertex in partitions.iter_mut().flatten() {
                    vertex.out_edges.clear();
                }
                (partitions.iter().flatten().cloned().collect(), Some(partitions))
            }
            (ResultGraph::New, Persist::Edges) => {
                (partitions.iter().flatten().cloned().collect(), Some(partitions))
            }
        };

        if !state.begin_publishing() {
            return Err(Error::Cancelled);
        }
        let output = Output {
            graph: persisted,
            memory: memory.persistent_entries(),
        };
        if self.overwrite_output {
            self.storage.replace_output(&self.output, &output)?;
        } else {
            self.storage.write_output(&self.output, &output)?;
        }

        Ok(ComputerResult::new(graph, memory.freeze()))
    }
}

/// Handle to a submitted job. It resolves exactly once, to the result or to
/// the error that ended the job.
pub struct ComputerFuture {
    receiver: oneshot::Receiver<Result<ComputerResult>>,
    state: Arc<JobState>,
    handle: Option<JoinHandle<()>>,
}

impl ComputerFuture {
    fn resolved(result: Result<ComputerResult>) -> Self {
        let (sender, receiver) = oneshot::channel();
        // The receiver is alive, so this can not fail.
        let _ = sender.send(result);
        ComputerFuture {
            receiver,
            state: Arc::new(JobState::new(FINISHED)),
            handle: None,
        }
    }

    /// Blocks until the job resolves.
    pub fn join(self) -> Result<ComputerResult> {
        let ComputerFuture { receiver, handle, .. } = self;
        let result = receiver.recv();
        let panicked = match handle {
            Some(handle) => handle.join().is_err(),
            None => false,
        };

        match result {
            Ok(result) => result,
            Err(_) if panicked => Err(Error::Aborted("the job thread panicked".to_string())),
            Err(_) => Err(Error::Aborted("the job ended without a result".to_string())),
        }
    }

    /// Returns the outcome if the job has resolved, or the handle back if it
    /// is still running.
    pub fn try_join(mut self) -> std::result::Result<Result<ComputerResult>, ComputerFuture> {
        match self.receiver.try_recv() {
            Ok(result) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!("Job thread panicked after resolving");
                    }
                }
                Ok(result)
            }
            Err(oneshot::TryRecvError::Empty) => Err(self),
            Err(oneshot::TryRecvError::Disconnected) => {
                Ok(Err(Error::Aborted("the job ended without a result".to_string())))
            }
        }
    }

    /// Asks the job to stop. It is honoured at the next barrier or between
    /// passes. Returns false if the job already started publishing or has
    /// resolved, in which case it runs to its normal outcome.
    pub fn cancel(&self) -> bool {
        let cancelled = self.state.cancel();
        if cancelled {
            info!("Cancellation requested");
        } else {
            debug!("Too late to cancel, the job is publishing or done");
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}
