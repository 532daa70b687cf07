use crate::message::Message;
use crate::Partitioner;

use tracing::warn;

use std::sync::mpsc;

enum ChannelMessage<M> {
    Content(Message<M>),
    HaltCmd,
}

/// One worker's end of the all-to-all message exchange: a receiver for its
/// own partition and a sender to every partition, itself included.
pub(crate) struct Channel<M> {
    partitioner: Partitioner,
    receiver: mpsc::Receiver<ChannelMessage<M>>,
    senders: Vec<mpsc::Sender<ChannelMessage<M>>>,
}

impl<M> Channel<M> {
    /// Creates one channel per partition, indexed by partition.
    pub fn create(partitioner: Partitioner) -> Vec<Channel<M>> {
        let n = partitioner.partitions();
        let mut receivers = Vec::with_capacity(n);
        let mut senders = Vec::with_capacity(n);
        for _ in 0..n {
            let (sender, receiver) = mpsc::channel();
            senders.push(sender);
            receivers.push(receiver);
        }

        receivers
            .into_iter()
            .map(|receiver| Channel {
                partitioner,
                receiver,
                senders: senders.clone(),
            })
            .collect()
    }

    /// Routes a message to the partition owning its receiver.
    pub fn send(&self, message: Message<M>) -> bool {
        let index = self.partitioner.partition_of(message.receiver);
        match self.senders[index].send(ChannelMessage::Content(message)) {
            Ok(_) => true,
            Err(_) => {
                warn!("Partition {} is gone, dropping message", index);
                false
            }
        }
    }

    pub fn send_done(&self) {
        for (index, sender) in self.senders.iter().enumerate() {
            if sender.send(ChannelMessage::HaltCmd).is_err() {
                warn!("Send halt command to partition {} failed", index);
            }
        }
    }

    /// Sends the halt command to every partition when dropped, so peers stop
    /// waiting even if this worker bails out early or panics.
    pub fn done_guard(&self) -> DoneGuard<'_, M> {
        DoneGuard { channel: self }
    }
}

pub(crate) struct DoneGuard<'a, M> {
    channel: &'a Channel<M>,
}

impl<M> Drop for DoneGuard<'_, M> {
    fn drop(&mut self) {
        self.channel.send_done();
    }
}

impl<'a, M> IntoIterator for &'a Channel<M> {
    type Item = Message<M>;
    type IntoIter = ChannelIterator<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        ChannelIterator {
            hlt_cnt: 0,
            channel: self,
        }
    }
}

/// Yields messages until every partition has sent its halt command.
pub(crate) struct ChannelIterator<'a, M> {
    hlt_cnt: usize,
    channel: &'a Channel<M>,
}

impl<M> Iterator for ChannelIterator<'_, M> {
    type Item = Message<M>;

    fn next(&mut self) -> Option<Message<M>> {
        if self.hlt_cnt >= self.channel.senders.len() {
            return None;
        }

        while let Ok(channel_message) = self.channel.receiver.recv() {
            match channel_message {
                ChannelMessage::Content(message) => return Some(message),
                ChannelMessage::HaltCmd => {
                    self.hlt_cnt += 1;
                    if self.hlt_cnt >= self.channel.senders.len() {
                        return None;
                    }
                }
            }
        }

        None
    }
}
