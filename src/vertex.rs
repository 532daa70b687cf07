use crate::graph::Properties;
use crate::message::Message;
use crate::{Combine, Edge, Error, FromValue, Result, StarVertex, Value};

use std::mem;

/// A vertex as the engine holds it during a computation: the stored vertex
/// plus its message queues. Only the worker owning its partition touches it.
pub struct Vertex<M> {
    id: i64,
    label: String,
    properties: Properties,
    out_edges: Vec<Edge>,
    active: bool,
    superstep: u64,
    recv_queue: Vec<M>,
    next_recv_queue: Vec<M>,
    pub(crate) send_queue: Vec<Message<M>>,
}

impl<M> Vertex<M> {
    pub fn new(id: i64, label: impl Into<String>) -> Self {
        Vertex::from(StarVertex::new(id, label))
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn superstep(&self) -> u64 {
        self.superstep
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    /// Every vertex still executes each superstep; the flag only feeds the
    /// active-vertex count in the superstep statistics.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn value<T: FromValue>(&self, key: &str) -> Result<T> {
        let value = self.property(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_string(),
        })?;
        T::from_value(value).ok_or_else(|| Error::TypeMismatch {
            key: key.to_string(),
            expected: T::TYPE_NAME,
            found: value.type_name(),
        })
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn out_edges(&self) -> &[Edge] {
        &self.out_edges
    }

    pub fn out_degree(&self) -> usize {
        self.out_edges.len()
    }

    pub fn send_message_to(&mut self, receiver: i64, value: M) {
        let message = Message::new(value, self.id, receiver);
        self.send_queue.push(message);
    }

    pub fn has_messages(&self) -> bool {
        !self.recv_queue.is_empty()
    }

    /// Messages delivered for the current superstep.
    pub fn messages(&self) -> std::slice::Iter<'_, M> {
        self.recv_queue.iter()
    }

    pub fn read_message(&mut self) -> Option<M> {
        self.recv_queue.pop()
    }

    pub fn take_messages(&mut self) -> Vec<M> {
        mem::take(&mut self.recv_queue)
    }

    /// Makes the messages received during the previous superstep current.
    pub(crate) fn begin_superstep(&mut self, superstep: u64) {
        self.superstep = superstep;
        self.recv_queue = mem::take(&mut self.next_recv_queue);
        self.send_queue.clear();
        self.active = true;
    }

    /// Queues a message for the next superstep.
    pub(crate) fn receive(&mut self, value: M, combiner: Option<&dyn Combine<M>>) {
        match (combiner, self.next_recv_queue.pop()) {
            (Some(combiner), Some(initial)) => {
                self.next_recv_queue.push(combiner.combine(initial, value));
            }
            (_, initial) => {
                self.next_recv_queue.extend(initial);
                self.next_recv_queue.push(value);
            }
        }
    }
}

impl<M: Clone> Vertex<M> {
    /// Sends `value` along every out edge.
    pub fn send_message(&mut self, value: M) {
        let targets: Vec<i64> = self.out_edges.iter().map(|e| e.target).collect();
        for target in targets {
            self.send_message_to(target, value.clone());
        }
    }
}

impl<M> From<StarVertex> for Vertex<M> {
    fn from(vertex: StarVertex) -> Self {
        Vertex {
            id: vertex.id,
            label: vertex.label,
            properties: vertex.properties,
            out_edges: vertex.out_edges,
            active: true,
            superstep: 0,
            recv_queue: Vec::new(),
            next_recv_queue: Vec::new(),
            send_queue: Vec::new(),
        }
    }
}

impl<M> From<Vertex<M>> for StarVertex {
    fn from(vertex: Vertex<M>) -> Self {
        StarVertex {
            id: vertex.id,
            label: vertex.label,
            properties: vertex.properties,
            out_edges: vertex.out_edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SumCombiner;

    #[test]
    fn messages_wait_for_the_next_superstep() {
        let mut vertex: Vertex<i64> = Vertex::new(1, "v");
        vertex.begin_superstep(0);
        vertex.receive(5, None);
        assert!(!vertex.has_messages());

        vertex.begin_superstep(1);
        assert_eq!(vertex.messages().copied().collect::<Vec<_>>(), vec![5]);
        assert_eq!(vertex.superstep(), 1);
    }

    #[test]
    fn received_messages_are_combined() {
        let mut vertex: Vertex<i64> = Vertex::new(1, "v");
        for value in [1, 2, 3] {
            vertex.receive(value, Some(&SumCombiner));
        }
        vertex.begin_superstep(1);
        assert_eq!(vertex.take_messages(), vec![6]);
        assert!(!vertex.has_messages());
    }

    #[test]
    fn broadcast_follows_out_edges() {
        let mut star = StarVertex::new(1, "v");
        star.out_edges.push(Edge::new(1, 2, "e"));
        star.out_edges.push(Edge::new(1, 3, "e"));
        let mut vertex: Vertex<&str> = Vertex::from(star);
        vertex.send_message("hi");

        let receivers: Vec<i64> = vertex.send_queue.iter().map(|m| m.receiver()).collect();
        assert_eq!(receivers, vec![2, 3]);
    }

    #[test]
    fn typed_properties() {
        let mut vertex: Vertex<()> = Vertex::new(1, "v");
        vertex.set_property("cluster", 4_i64);
        assert_eq!(vertex.value::<i64>("cluster").unwrap(), 4);
        assert!(matches!(vertex.value::<bool>("cluster"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(vertex.value::<i64>("missing"), Err(Error::KeyNotFound { .. })));
    }
}
