use crate::{Error, FromValue, KeyValue, Result, Value};

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// How concurrent contributions to one memory key are folded together.
/// Every operator is associative and commutative, so the merged value does
/// not depend on how vertices were partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Sum,
    Min,
    Max,
    And,
    Or,
}

impl Operator {
    pub fn apply(&self, key: &str, a: Value, b: Value) -> Result<Value> {
        let mismatch = |expected: &'static str, found: &Value| Error::TypeMismatch {
            key: key.to_string(),
            expected,
            found: found.type_name(),
        };

        match self {
            Operator::Sum => match (a, b) {
                (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.saturating_add(y))),
                (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
                (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                    Ok(Value::Float(x as f64 + y))
                }
                (Value::Int(_), other) | (Value::Float(_), other) | (other, _) => {
                    Err(mismatch("number", &other))
                }
            },
            Operator::Min | Operator::Max => {
                let ordering = compare(&a, &b).ok_or_else(|| mismatch(a.type_name(), &b))?;
                let keep_a = match self {
                    Operator::Min => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(if keep_a { a } else { b })
            }
            Operator::And | Operator::Or => match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => {
                    Ok(Value::Bool(if *self == Operator::And { x && y } else { x || y }))
                }
                (Value::Bool(_), other) | (other, _) => Err(mismatch("bool", &other)),
            },
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A memory key a vertex program reads and contributes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryComputeKey {
    pub key: String,
    pub operator: Operator,
    /// Transient keys are dropped instead of persisted with the result.
    pub transient: bool,
}

impl MemoryComputeKey {
    pub fn new(key: impl Into<String>, operator: Operator) -> Self {
        MemoryComputeKey {
            key: key.into(),
            operator,
            transient: false,
        }
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// Figures gathered at every barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperstepStats {
    pub superstep: u64,
    pub vertices: usize,
    pub edges: usize,
    pub active_vertices: usize,
    pub messages_sent: usize,
}

/// Contributions a single worker made during one superstep.
pub(crate) type MemoryDelta = BTreeMap<String, Value>;

/// Master-side memory. Only the engine thread holds it mutably, between
/// supersteps; workers see it through [`WorkerMemory`].
#[derive(Debug)]
pub struct Memory {
    keys: BTreeMap<String, MemoryComputeKey>,
    values: BTreeMap<String, Value>,
    iteration: u64,
    stats: SuperstepStats,
    converged: bool,
    started: Instant,
}

impl Memory {
    pub(crate) fn new(keys: impl IntoIterator<Item = MemoryComputeKey>) -> Self {
        Memory {
            keys: keys.into_iter().map(|k| (k.key.clone(), k)).collect(),
            values: BTreeMap::new(),
            iteration: 0,
            stats: SuperstepStats::default(),
            converged: false,
            started: Instant::now(),
        }
    }

    fn compute_key(&self, key: &str) -> Result<&MemoryComputeKey> {
        self.keys.get(key).ok_or_else(|| Error::UndeclaredMemoryKey {
            key: key.to_string(),
        })
    }

    pub fn get_value(&self, key: &str) -> Result<&Value> {
        self.values.get(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })
    }

    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        typed(key, self.get_value(key)?)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Overwrites a declared key.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.compute_key(key)?;
        self.values.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Folds `value` into a declared key with the key's operator.
    pub fn add(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let operator = self.compute_key(key)?.operator;
        let merged = match self.values.remove(key) {
            Some(current) => operator.apply(key, current, value.into())?,
            None => value.into(),
        };
        self.values.insert(key.to_string(), merged);
        Ok(())
    }

    /// Supersteps completed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn is_initial_iteration(&self) -> bool {
        self.iteration == 0
    }

    pub fn stats(&self) -> &SuperstepStats {
        &self.stats
    }

    pub fn runtime(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn merge(&mut self, delta: MemoryDelta) -> Result<()> {
        for (key, value) in delta {
            self.add(&key, value)?;
        }
        Ok(())
    }

    pub(crate) fn complete_superstep(&mut self, stats: SuperstepStats) {
        self.iteration += 1;
        self.stats = stats;
    }

    pub(crate) fn mark_converged(&mut self) {
        self.converged = true;
    }

    /// Stores a map-reduce result. Such keys are always persisted.
    pub(crate) fn set_result(&mut self, key: &str, value: Value) {
        self.keys
            .entry(key.to_string())
            .or_insert_with(|| MemoryComputeKey::new(key, Operator::Sum));
        self.values.insert(key.to_string(), value);
    }

    pub(crate) fn persistent_entries(&self) -> Vec<KeyValue> {
        self.values
            .iter()
            .filter(|(key, _)| self.keys.get(*key).map(|k| !k.transient).unwrap_or(false))
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect()
    }

    /// Transient keys do not survive the computation.
    pub(crate) fn freeze(self) -> ResultMemory {
        let keys = self.keys;
        ResultMemory {
            runtime: self.started.elapsed(),
            values: self
                .values
                .into_iter()
                .filter(|(key, _)| keys.get(key).map(|k| !k.transient).unwrap_or(false))
                .collect(),
            iteration: self.iteration,
            converged: self.converged,
        }
    }
}

fn typed<T: FromValue>(key: &str, value: &Value) -> Result<T> {
    T::from_value(value).ok_or_else(|| Error::TypeMismatch {
        key: key.to_string(),
        expected: T::TYPE_NAME,
        found: value.type_name(),
    })
}

/// What vertex logic sees during a superstep: the memory as of the previous
/// barrier plus this worker's own pending contributions.
pub struct WorkerMemory<'a> {
    snapshot: &'a Memory,
    delta: MemoryDelta,
}

impl<'a> WorkerMemory<'a> {
    pub(crate) fn new(snapshot: &'a Memory) -> Self {
        WorkerMemory {
            snapshot,
            delta: MemoryDelta::new(),
        }
    }

    pub fn get_value(&self, key: &str) -> Result<&Value> {
        self.snapshot.get_value(key)
    }

    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        self.snapshot.get(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.snapshot.exists(key)
    }

    pub fn iteration(&self) -> u64 {
        self.snapshot.iteration()
    }

    pub fn is_initial_iteration(&self) -> bool {
        self.snapshot.is_initial_iteration()
    }

    /// Contributes to a key. Visible to everyone after the next barrier.
    pub fn add(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let operator = self.snapshot.compute_key(key)?.operator;
        let merged = match self.delta.remove(key) {
            Some(current) => operator.apply(key, current, value.into())?,
            None => value.into(),
        };
        self.delta.insert(key.to_string(), merged);
        Ok(())
    }

    pub(crate) fn into_delta(self) -> MemoryDelta {
        self.delta
    }
}

/// The frozen memory of a finished computation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMemory {
    values: BTreeMap<String, Value>,
    iteration: u64,
    runtime: Duration,
    converged: bool,
}

impl ResultMemory {
    pub fn get_value(&self, key: &str) -> Result<&Value> {
        self.values.get(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })
    }

    pub fn get<T: FromValue>(&self, key: &str) -> Result<T> {
        typed(key, self.get_value(key)?)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Memory {
        Memory::new(vec![
            MemoryComputeKey::new("count", Operator::Sum),
            MemoryComputeKey::new("halt", Operator::And).transient(),
            MemoryComputeKey::new("low", Operator::Min),
        ])
    }

    #[test]
    fn operators_fold_values() {
        assert_eq!(Operator::Sum.apply("k", Value::Int(2), Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(
            Operator::Sum.apply("k", Value::Int(2), Value::Float(0.5)).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(Operator::Max.apply("k", Value::Int(2), Value::Int(3)).unwrap(), Value::Int(3));
        assert_eq!(
            Operator::Min.apply("k", Value::from("b"), Value::from("a")).unwrap(),
            Value::from("a")
        );
        assert_eq!(
            Operator::Or.apply("k", Value::Bool(false), Value::Bool(true)).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            Operator::And.apply("k", Value::Bool(true), Value::Int(1)),
            Err(Error::TypeMismatch { expected: "bool", found: "int", .. })
        ));
        assert!(matches!(
            Operator::Sum.apply("k", Value::from("x"), Value::Int(1)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn workers_see_the_previous_barrier() {
        let mut memory = memory();
        memory.set("count", 10_i64).unwrap();

        let mut worker = WorkerMemory::new(&memory);
        worker.add("count", 1_i64).unwrap();
        worker.add("count", 2_i64).unwrap();
        assert_eq!(worker.get::<i64>("count").unwrap(), 10);

        let delta = worker.into_delta();
        memory.merge(delta).unwrap();
        assert_eq!(memory.get::<i64>("count").unwrap(), 13);
    }

    #[test]
    fn undeclared_keys_are_rejected() {
        let memory = memory();
        let mut worker = WorkerMemory::new(&memory);
        assert!(matches!(
            worker.add("other", 1_i64),
            Err(Error::UndeclaredMemoryKey { .. })
        ));
    }

    #[test]
    fn transient_keys_are_not_persisted() {
        let mut memory = memory();
        memory.set("count", 1_i64).unwrap();
        memory.set("halt", true).unwrap();
        memory.set_result("clusterCount", Value::Int(2));

        let keys: Vec<String> = memory.persistent_entries().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["clusterCount".to_string(), "count".to_string()]);
    }

    #[test]
    fn frozen_memory_checks_types() {
        let mut memory = memory();
        memory.set("count", 2_i64).unwrap();
        memory.set("halt", false).unwrap();
        memory.complete_superstep(SuperstepStats::default());
        let frozen = memory.freeze();

        assert!(!frozen.exists("halt"));
        assert_eq!(frozen.get::<i64>("count").unwrap(), 2);
        assert_eq!(frozen.iteration(), 1);
        assert!(!frozen.is_converged());
        assert!(matches!(frozen.get::<i64>("nope"), Err(Error::KeyNotFound { .. })));
        assert!(matches!(
            frozen.get::<String>("count"),
            Err(Error::TypeMismatch { expected: "string", found: "int", .. })
        ));
    }
}
