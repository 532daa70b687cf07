/// A value addressed from one vertex to another, delivered at the start of
/// the next superstep.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<M> {
    pub(crate) value: M,
    pub(crate) sender: i64,
    pub(crate) receiver: i64,
}

impl<M> Message<M> {
    pub fn new(value: M, sender: i64, receiver: i64) -> Self {
        Message {
            value,
            sender,
            receiver,
        }
    }

    pub fn sender(&self) -> i64 {
        self.sender
    }

    pub fn receiver(&self) -> i64 {
        self.receiver
    }

    pub fn into_value(self) -> M {
        self.value
    }
}
