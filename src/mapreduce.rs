use crate::{Error, Result, StarVertex, Value};

use tracing::debug;

use std::collections::BTreeMap;
use std::mem;
use std::thread;

/// Collects the pairs a [`MapReduce::map`] call emits.
pub struct Emitter<K, V> {
    pairs: Vec<(K, V)>,
}

impl<K: Ord, V> Emitter<K, V> {
    pub(crate) fn new() -> Self {
        Emitter { pairs: Vec::new() }
    }

    pub fn emit(&mut self, key: K, value: V) {
        self.pairs.push((key, value));
    }

    fn into_groups(self) -> BTreeMap<K, Vec<V>> {
        let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
        for (key, value) in self.pairs {
            groups.entry(key).or_default().push(value);
        }
        groups
    }
}

/// A post-processing pass over the final graph.
///
/// `map` runs per vertex on the partition's own thread, `combine` (when
/// [`does_combine`](MapReduce::does_combine) is true) shrinks each
/// partition's groups before they leave it, and `reduce` folds all values
/// of one key. Combining must not change what `reduce` produces.
pub trait MapReduce: Send + Sync {
    type Key: Ord + Clone + Send;
    type Value: Clone + Send;

    /// Memory key the final result is stored under.
    fn memory_key(&self) -> &str;

    fn map(&self, vertex: &StarVertex, emitter: &mut Emitter<Self::Key, Self::Value>);

    fn does_combine(&self) -> bool {
        false
    }

    fn combine(&self, _key: &Self::Key, values: Vec<Self::Value>) -> Vec<Self::Value> {
        values
    }

    fn reduce(&self, key: &Self::Key, values: Vec<Self::Value>) -> Self::Value;

    /// Turns the reduced pairs, in key order, into the value stored in memory.
    fn generate_final_result(&self, pairs: Vec<(Self::Key, Self::Value)>) -> Value;
}

/// A [`MapReduce`] with its key and value types erased, as the computer
/// holds it.
pub(crate) trait MapReducePass: Send + Sync {
    fn key(&self) -> &str;

    fn execute(&self, partitions: &[Vec<StarVertex>], superstep: u64) -> Result<Value>;
}

impl<T: MapReduce> MapReducePass for T {
    fn key(&self) -> &str {
        MapReduce::memory_key(self)
    }

    fn execute(&self, partitions: &[Vec<StarVertex>], superstep: u64) -> Result<Value> {
        let mapped: Vec<Result<BTreeMap<T::Key, Vec<T::Value>>>> = thread::scope(|s| {
            let handles: Vec<_> = partitions
                .iter()
                .enumerate()
                .map(|(id, vertices)| (id, s.spawn(move || self.map_partition(vertices))))
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| handle.join().map_err(|panic| Error::panicked(id, superstep, panic)))
                .collect()
        });

        let mut groups: BTreeMap<T::Key, Vec<T::Value>> = BTreeMap::new();
        for partition in mapped {
            for (key, mut values) in partition? {
                groups.entry(key).or_default().append(&mut values);
            }
        }
        debug!("Pass {} reducing {} keys", MapReduce::memory_key(self), groups.len());

        let pairs = groups
            .into_iter()
            .map(|(key, values)| {
                let value = self.reduce(&key, values);
                (key, value)
            })
            .collect();
        Ok(self.generate_final_result(pairs))
    }
}

trait MapPartition: MapReduce {
    fn map_partition(&self, vertices: &[StarVertex]) -> BTreeMap<Self::Key, Vec<Self::Value>> {
        let mut emitter = Emitter::new();
        for vertex in vertices {
            self.map(vertex, &mut emitter);
        }

        let mut groups = emitter.into_groups();
        if self.does_combine() {
            for (key, values) in groups.iter_mut() {
                let taken = mem::take(values);
                *values = self.combine(key, taken);
            }
        }
        groups
    }
}

impl<T: MapReduce> MapPartition for T {}
