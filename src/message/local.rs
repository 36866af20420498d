//! Provides a transport for a group of ranks living on threads of one
//! process.
//!
//! Each rank owns an inbox channel that every other rank in the group holds a
//! sender to, plus a loopback channel for messages to itself. Messages pulled
//! off the channels while the rank is looking for a different (source, tag)
//! pair are parked in an undelivered list until somebody asks for them, so
//! the per-(source, tag) ordering of the channels is preserved.
//!
//! Once every other member has been dropped and its messages consumed,
//! `probe` and `recv` fail instead of blocking, unless the message can only
//! come from this rank (a receive from itself, or any receive in a group of
//! one).

use super::transport::{Probe, Rank, Tag, ThreadLevel, Transport};
use crate::error::{Error, Operation, Result};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, PoisonError};

/// How much buffering a [`LocalTransport`] provides on the send side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// `send` returns as soon as the message is queued in the peer's inbox.
    Buffered,
    /// `send` returns only once the peer has received the message. This is
    /// the worst case a blocking transport is allowed to exhibit.
    Rendezvous,
}

struct Message {
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
    receipt: Option<Sender<()>>,
}

struct Inbox {
    rank: Rank,
    remote: Receiver<Message>,
    loopback: Receiver<Message>,
    remote_open: bool,
    undelivered: VecDeque<Message>,
}

impl Inbox {
    /// Returns the position in the undelivered list of the oldest message
    /// accepted by `filter`, blocking on the channels until one shows up.
    /// `local` is set when the awaited message can only come from this rank;
    /// such a wait keeps blocking after the rest of the group has left.
    fn wait_for<F>(&mut self, op: Operation, local: bool, filter: F) -> Result<usize>
    where
        F: Fn(&Message) -> bool,
    {
        if let Some(index) = self.undelivered.iter().position(|m| filter(m)) {
            return Ok(index);
        }
        loop {
            let message = self.next(op, local)?;
            let matched = filter(&message);
            self.undelivered.push_back(message);

            if matched {
                return Ok(self.undelivered.len() - 1);
            }
        }
    }

    fn next(&mut self, op: Operation, local: bool) -> Result<Message> {
        if self.remote_open {
            crossbeam_channel::select! {
                recv(self.remote) -> message => match message {
                    Ok(message) => return Ok(message),
                    Err(_) => self.remote_open = false,
                },
                recv(self.loopback) -> message => {
                    return message.map_err(|_| Error::transport(op, "loopback disconnected"));
                }
            }
        }
        if local {
            self.loopback
                .recv()
                .map_err(|_| Error::transport(op, "loopback disconnected"))
        } else {
            self.loopback.try_recv().map_err(|_| {
                Error::transport(
                    op,
                    format!("every rank but {} has left the group", self.rank),
                )
            })
        }
    }
}

/// One rank of an in-process group created by [`LocalTransport::group`].
/// Hand each member to its own thread.
pub struct LocalTransport {
    rank: Rank,
    delivery: Delivery,
    granted: ThreadLevel,
    peers: Vec<Option<Sender<Message>>>,
    loopback: Sender<Message>,
    inbox: Mutex<Inbox>,
    barrier: Arc<Barrier>,
    finalized: AtomicBool,
}

impl LocalTransport {
    /// Creates the members of a group of `size` ranks, ordered by rank.
    pub fn group(size: usize, delivery: Delivery) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        let barrier = Arc::new(Barrier::new(size));

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, remote)| {
                let (loopback, loopback_r) = crossbeam_channel::unbounded();
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| Some(sender.clone()).filter(|_| peer != rank))
                    .collect();
                Self {
                    rank,
                    delivery,
                    granted: ThreadLevel::Multiple,
                    peers,
                    loopback,
                    inbox: Mutex::new(Inbox {
                        rank,
                        remote,
                        loopback: loopback_r,
                        remote_open: true,
                        undelivered: VecDeque::new(),
                    }),
                    barrier: barrier.clone(),
                    finalized: AtomicBool::new(false),
                }
            })
            .collect()
    }

    /// Sets the threading level `init` will grant, regardless of the level
    /// requested.
    pub fn with_thread_level(mut self, granted: ThreadLevel) -> Self {
        self.granted = granted;
        self
    }

    fn ensure_running(&self, op: Operation) -> Result<()> {
        if self.finalized.load(Ordering::SeqCst) {
            Err(Error::transport(op, "transport is finalized"))
        } else {
            Ok(())
        }
    }
}

impl Transport for LocalTransport {
    fn init(&self, _required: ThreadLevel) -> Result<ThreadLevel> {
        self.ensure_running(Operation::Init)?;
        Ok(self.granted)
    }

    fn finalize(&self) -> Result<()> {
        self.finalized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.ensure_running(Operation::Barrier)?;
        self.barrier.wait();
        Ok(())
    }

    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, bytes: &[u8], dest: Rank, tag: Tag) -> Result<()> {
        self.ensure_running(Operation::Send)?;
        let peer = match self.peers.get(dest) {
            Some(Some(peer)) => peer,
            Some(None) => &self.loopback,
            None => {
                return Err(Error::transport(
                    Operation::Send,
                    format!("no rank {} in the group", dest),
                ))
            }
        };
        let (receipt, confirmation) = match self.delivery {
            Delivery::Buffered => (None, None),
            Delivery::Rendezvous => {
                let (s, r) = crossbeam_channel::bounded(1);
                (Some(s), Some(r))
            }
        };
        let message = Message {
            source: self.rank,
            tag,
            payload: bytes.to_vec(),
            receipt,
        };
        peer.send(message).map_err(|_| {
            Error::transport(Operation::Send, format!("rank {} has left the group", dest))
        })?;

        if let Some(confirmation) = confirmation {
            confirmation.recv().map_err(|_| {
                Error::transport(
                    Operation::Send,
                    format!("rank {} discarded the message", dest),
                )
            })?;
        }
        Ok(())
    }

    fn recv(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<()> {
        self.ensure_running(Operation::Recv)?;
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        let local = source == self.rank;
        let index = inbox.wait_for(Operation::Recv, local, |m| {
            m.source == source && m.tag == tag
        })?;
        let message = inbox
            .undelivered
            .remove(index)
            .ok_or_else(|| Error::transport(Operation::Recv, "undelivered list out of sync"))?;

        if message.payload.len() != buffer.len() {
            return Err(Error::transport(
                Operation::Recv,
                format!(
                    "message of {} bytes does not fit a buffer of {} bytes",
                    message.payload.len(),
                    buffer.len()
                ),
            ));
        }
        buffer.copy_from_slice(&message.payload);

        if let Some(receipt) = message.receipt {
            receipt.send(()).ok();
        }
        Ok(())
    }

    fn probe(&self, tag: Tag) -> Result<Probe> {
        self.ensure_running(Operation::Probe)?;
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        let local = self.peers.len() == 1;
        let index = inbox.wait_for(Operation::Probe, local, |m| m.tag == tag)?;
        let message = &inbox.undelivered[index];
        Ok(Probe {
            source: message.source,
            tag: message.tag,
            count: message.payload.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn receive(transport: &LocalTransport, tag: Tag) -> (Rank, Vec<u8>) {
        let probe = transport.probe(tag).unwrap();
        let mut buffer = vec![0; probe.count];
        transport.recv(&mut buffer, probe.source, tag).unwrap();
        (probe.source, buffer)
    }

    #[test]
    fn group_members_know_their_rank_and_size() {
        let group = LocalTransport::group(3, Delivery::Buffered);
        assert_eq!(group.len(), 3);
        for (rank, member) in group.iter().enumerate() {
            assert_eq!(member.rank(), rank);
            assert_eq!(member.size(), 3);
        }
    }

    #[test]
    fn buffered_send_can_be_probed_then_received() {
        let group = LocalTransport::group(2, Delivery::Buffered);
        group[0].send(&[1, 2, 3], 1, 5).unwrap();
        let probe = group[1].probe(5).unwrap();
        assert_eq!(probe, Probe { source: 0, tag: 5, count: 3 });
        assert_eq!(receive(&group[1], 5), (0, vec![1, 2, 3]));
    }

    #[test]
    fn probe_does_not_consume_the_message() {
        let group = LocalTransport::group(2, Delivery::Buffered);
        group[0].send(&[9], 1, 0).unwrap();
        assert_eq!(group[1].probe(0).unwrap().count, 1);
        assert_eq!(group[1].probe(0).unwrap().count, 1);
        assert_eq!(receive(&group[1], 0), (0, vec![9]));
    }

    #[test]
    fn messages_on_other_tags_are_parked() {
        let group = LocalTransport::group(2, Delivery::Buffered);
        group[0].send(b"first", 1, 1).unwrap();
        group[0].send(b"second", 1, 2).unwrap();
        assert_eq!(receive(&group[1], 2), (0, b"second".to_vec()));
        assert_eq!(receive(&group[1], 1), (0, b"first".to_vec()));
    }

    #[test]
    fn same_source_and_tag_arrive_in_send_order() {
        let group = LocalTransport::group(2, Delivery::Buffered);
        for n in 0..10u8 {
            group[0].send(&[n], 1, 4).unwrap();
        }
        for n in 0..10u8 {
            assert_eq!(receive(&group[1], 4).1, vec![n]);
        }
    }

    #[test]
    fn wrongly_sized_buffer_is_a_transport_error() {
        let group = LocalTransport::group(2, Delivery::Buffered);
        group[0].send(&[1, 2, 3, 4], 1, 0).unwrap();
        let mut buffer = vec![0; 2];
        let error = group[1].recv(&mut buffer, 0, 0).unwrap_err();
        assert!(error.is_transport());
    }

    #[test]
    fn send_to_missing_rank_fails() {
        let group = LocalTransport::group(2, Delivery::Buffered);
        assert!(group[0].send(&[], 2, 0).unwrap_err().is_transport());
    }

    #[test]
    fn rendezvous_send_waits_for_the_receiver() {
        let mut group = LocalTransport::group(2, Delivery::Rendezvous);
        let receiver = group.pop().unwrap();
        let sender = group.pop().unwrap();
        let stage = Arc::new(AtomicUsize::new(0));

        let handle = {
            let stage = stage.clone();
            thread::spawn(move || {
                sender.send(&[7; 16], 1, 3).unwrap();
                assert_eq!(stage.load(Ordering::SeqCst), 1);
            })
        };
        thread::sleep(Duration::from_millis(50));
        stage.store(1, Ordering::SeqCst);
        assert_eq!(receive(&receiver, 3), (0, vec![7; 16]));
        handle.join().unwrap();
    }

    #[test]
    fn operations_fail_after_finalize() {
        let group = LocalTransport::group(1, Delivery::Buffered);
        group[0].finalize().unwrap();
        assert!(group[0].send(&[], 0, 0).unwrap_err().is_transport());
        assert!(group[0].init(ThreadLevel::Single).unwrap_err().is_transport());
    }

    #[test]
    fn granted_thread_level_can_be_downgraded() {
        let member = LocalTransport::group(1, Delivery::Buffered).pop().unwrap();
        let member = member.with_thread_level(ThreadLevel::Funneled);
        assert_eq!(member.init(ThreadLevel::Multiple).unwrap(), ThreadLevel::Funneled);
    }

    #[test]
    fn waiting_on_departed_ranks_fails() {
        let mut group = LocalTransport::group(3, Delivery::Buffered);
        let last = group.pop().unwrap();
        group[1].send(b"parting", 0, 1).unwrap();
        drop(last);
        let member = group.remove(0);
        drop(group);

        assert_eq!(receive(&member, 1), (1, b"parting".to_vec()));
        assert!(member.probe(1).unwrap_err().is_transport());
        let mut buffer = vec![0; 7];
        assert!(member.recv(&mut buffer, 2, 1).unwrap_err().is_transport());
    }

    #[test]
    fn messages_to_self_survive_the_rest_of_the_group() {
        let mut group = LocalTransport::group(2, Delivery::Buffered);
        let member = group.remove(0);
        drop(group);

        member.send(b"note", 0, 2).unwrap();
        assert_eq!(receive(&member, 2), (0, b"note".to_vec()));
    }

    #[test]
    fn lone_member_waits_for_its_own_rendezvous_send() {
        let member = Arc::new(LocalTransport::group(1, Delivery::Rendezvous).remove(0));
        let handle = {
            let member = member.clone();
            thread::spawn(move || member.send(b"self", 0, 0).unwrap())
        };
        assert_eq!(receive(&member, 0), (0, b"self".to_vec()));
        handle.join().unwrap();
    }
}
