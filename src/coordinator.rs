//! Tagged rank-to-rank exchange on top of an open [`Session`].
//!
//! Every receive goes through the transport in two steps: a tag-scoped
//! probe that reports the source and byte count of the next message, then a
//! receive into a buffer allocated to exactly that size. The transport
//! requires pre-sized receive buffers, so skipping the probe would risk
//! truncation.
//!
//! [`Coordinator::exchange_all`] is the composite operation for rounds in
//! which a rank trades messages with a known set of peers (a halo exchange,
//! a gather to a root). Its sends are posted on a sender thread before the
//! calling thread starts draining receives, and receives never wait on
//! sends. Two ranks exchanging reciprocally therefore complete even on a
//! transport that buffers nothing on the send side. Completion is keyed off
//! the resolved source of each message, not the order of arrival.
//!
//! The collectives ([`Coordinator::broadcast`], [`Coordinator::gather`],
//! [`Coordinator::reduce`], [`Coordinator::all_reduce`]) are linear: the
//! root talks to every other rank directly, through the same primitives.

use crate::coder::Coder;
use crate::config::TagSpace;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::message::{Probe, Rank, Tag, ThreadLevel, Transport};
use crate::pending::PendingExchange;
use crate::session::Session;
use std::collections::{BTreeMap, BTreeSet};
use std::{panic, thread};

/// Exchanges messages between this rank and its peers. The coordinator
/// only reads the session; it is meant to be driven by one thread.
pub struct Coordinator<'s, T: Transport> {
    session: &'s Session<T>,
    tags: TagSpace,
}

impl<'s, T: Transport> Coordinator<'s, T> {
    pub fn new(session: &'s Session<T>, tags: TagSpace) -> Self {
        Self { session, tags }
    }

    pub fn session(&self) -> &'s Session<T> {
        self.session
    }

    pub fn tags(&self) -> &TagSpace {
        &self.tags
    }

    /// Send `payload` to `peer`. Blocks until the transport has taken the
    /// message, which says nothing about delivery.
    pub fn send_to(&self, peer: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let transport = self.prepare(tag)?;
        self.check_rank(peer)?;
        Self::post(transport, Envelope::new(peer, tag, payload))
    }

    /// Encode `value` with `coder` and send it to `peer`.
    pub fn send_encoded<C: Coder>(
        &self,
        peer: Rank,
        tag: Tag,
        coder: &C,
        value: &C::Type,
    ) -> Result<()> {
        self.prepare(tag)?;
        self.send_to(peer, tag, coder.encode(value)?)
    }

    /// Receive the next message on `tag`, which must come from `peer`.
    ///
    /// The probe that sizes the buffer accepts any source. If it reports a
    /// different sender this fails with [`Error::UnexpectedPeer`] and the
    /// probed message stays with the transport, to be picked up by a later
    /// receive.
    pub fn receive_from(&self, peer: Rank, tag: Tag) -> Result<Envelope> {
        let transport = self.prepare(tag)?;
        self.check_rank(peer)?;
        let probe = self.probe(transport, tag)?;

        if probe.source != peer {
            return Err(Error::UnexpectedPeer {
                expected: Some(peer),
                actual: probe.source,
                tag,
            });
        }
        Self::consume(transport, probe)
    }

    /// Receive the next message on `tag` from any source. The returned
    /// envelope carries the resolved source.
    pub fn receive_any(&self, tag: Tag) -> Result<Envelope> {
        let transport = self.prepare(tag)?;
        let probe = self.probe(transport, tag)?;
        Self::consume(transport, probe)
    }

    /// Send each payload in `outgoing` to its rank, and receive exactly one
    /// message on `tag` from each rank in `peers`. Returns the received
    /// envelopes keyed by source.
    ///
    /// The round fails as a whole: a transport error, or a message from a
    /// rank that is not among the outstanding `peers`, aborts it and no
    /// partial result is returned. There is no cancellation, so a failing
    /// receive still waits for this rank's own sends to be taken by the
    /// transport.
    ///
    /// Consecutive rounds of the same exchange should use different tags
    /// (see [`TagSpace::tag_for_round`]), since a neighbor that is a round
    /// ahead may already have sent its next message.
    ///
    /// Sends run on their own thread only if the transport granted
    /// [`ThreadLevel::Multiple`]. Under a weaker grant every transport call
    /// stays on the calling thread and the sends are all posted before the
    /// first receive, which needs a transport that buffers sends.
    pub fn exchange_all(
        &self,
        peers: &BTreeSet<Rank>,
        tag: Tag,
        outgoing: BTreeMap<Rank, Vec<u8>>,
    ) -> Result<BTreeMap<Rank, Envelope>> {
        let transport = self.prepare(tag)?;

        for &rank in peers.iter().chain(outgoing.keys()) {
            self.check_rank(rank)?;
        }
        let mut pending = PendingExchange::new(tag, peers.iter().copied());
        let envelopes: Vec<_> = outgoing
            .into_iter()
            .map(|(peer, payload)| Envelope::new(peer, tag, payload))
            .collect();

        let received = if self.session.thread_level()? == ThreadLevel::Multiple {
            self.exchange_concurrently(transport, envelopes, &mut pending)?
        } else {
            for envelope in envelopes {
                Self::post(transport, envelope)?;
            }
            self.drain(transport, &mut pending)?
        };

        tracing::debug!(tag, peers = received.len(), "exchange round complete");
        Ok(received)
    }

    /// Send `payload` from `root` to every other rank. Every rank returns the
    /// root's payload; the argument is ignored on the other ranks.
    pub fn broadcast(&self, root: Rank, tag: Tag, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.check_rank(root)?;

        if self.session.rank()? == root {
            let outgoing = self
                .others(root)?
                .into_iter()
                .map(|peer| (peer, payload.clone()))
                .collect();
            self.exchange_all(&BTreeSet::new(), tag, outgoing)?;
            Ok(payload)
        } else {
            Ok(self.receive_from(root, tag)?.into_payload())
        }
    }

    /// Collect every rank's payload on `root`, keyed by rank. The other
    /// ranks get back an empty map.
    ///
    /// Messages are matched to ranks by source only, so two gathers in a
    /// row need different tags.
    pub fn gather(
        &self,
        root: Rank,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<BTreeMap<Rank, Vec<u8>>> {
        self.check_rank(root)?;

        if self.session.rank()? == root {
            let peers = self.others(root)?;
            let mut gathered: BTreeMap<_, _> = self
                .exchange_all(&peers, tag, BTreeMap::new())?
                .into_iter()
                .map(|(peer, envelope)| (peer, envelope.into_payload()))
                .collect();
            gathered.insert(root, payload);
            Ok(gathered)
        } else {
            let outgoing = vec![(root, payload)].into_iter().collect();
            self.exchange_all(&BTreeSet::new(), tag, outgoing)?;
            Ok(BTreeMap::new())
        }
    }

    /// Combine every rank's `value` with `op` on `root`, folding in rank
    /// order. Returns `Some` on the root and `None` elsewhere.
    pub fn reduce<C, F>(
        &self,
        root: Rank,
        tag: Tag,
        coder: &C,
        value: C::Type,
        op: F,
    ) -> Result<Option<C::Type>>
    where
        C: Coder,
        F: Fn(C::Type, C::Type) -> C::Type,
    {
        let gathered = self.gather(root, tag, coder.encode(&value)?)?;
        let mut result = None;

        for bytes in gathered.values() {
            let value = coder.decode(bytes)?;
            result = Some(match result {
                Some(acc) => op(acc, value),
                None => value,
            });
        }
        Ok(result)
    }

    /// Reduce to rank 0, then broadcast the result, so that every rank
    /// returns the same value.
    pub fn all_reduce<C, F>(&self, tag: Tag, coder: &C, value: C::Type, op: F) -> Result<C::Type>
    where
        C: Coder,
        F: Fn(C::Type, C::Type) -> C::Type,
    {
        let root = 0;
        let payload = match self.reduce(root, tag, coder, value, op)? {
            Some(reduced) => coder.encode(&reduced)?,
            None => Vec::new(),
        };
        coder.decode(&self.broadcast(root, tag, payload)?)
    }

    /// Posts the sends on a scoped thread while the calling thread drains.
    fn exchange_concurrently(
        &self,
        transport: &'s T,
        envelopes: Vec<Envelope>,
        pending: &mut PendingExchange,
    ) -> Result<BTreeMap<Rank, Envelope>> {
        let (sent, received) = thread::scope(|scope| {
            let sender = if envelopes.is_empty() {
                None
            } else {
                Some(scope.spawn(move || -> Result<()> {
                    for envelope in envelopes {
                        Self::post(transport, envelope)?;
                    }
                    Ok(())
                }))
            };
            let received = self.drain(transport, pending);
            let sent = match sender {
                Some(handle) => handle
                    .join()
                    .unwrap_or_else(|payload| panic::resume_unwind(payload)),
                None => Ok(()),
            };
            (sent, received)
        });
        sent?;
        received
    }

    fn drain(
        &self,
        transport: &T,
        pending: &mut PendingExchange,
    ) -> Result<BTreeMap<Rank, Envelope>> {
        let mut received = BTreeMap::new();

        while !pending.is_complete() {
            let probe = self.probe(transport, pending.tag())?;
            pending.satisfy(probe.source)?;
            let envelope = Self::consume(transport, probe)?;
            received.insert(envelope.peer(), envelope);
        }
        Ok(received)
    }

    fn prepare(&self, tag: Tag) -> Result<&'s T> {
        let transport = self.session.transport()?;

        if self.tags.contains(tag) {
            Ok(transport)
        } else {
            Err(Error::Protocol {
                tag,
                space: self.tags.clone(),
            })
        }
    }

    fn others(&self, rank: Rank) -> Result<BTreeSet<Rank>> {
        Ok((0..self.session.size()?).filter(|&p| p != rank).collect())
    }

    fn check_rank(&self, rank: Rank) -> Result<()> {
        let size = self.session.size()?;

        if rank < size {
            Ok(())
        } else {
            Err(Error::InvalidRank { rank, size })
        }
    }

    fn probe(&self, transport: &T, tag: Tag) -> Result<Probe> {
        let probe = transport.probe(tag)?;
        tracing::trace!(tag, source = probe.source, count = probe.count, "probed");

        if probe.tag != tag || !self.tags.contains(probe.tag) {
            return Err(Error::Protocol {
                tag: probe.tag,
                space: self.tags.clone(),
            });
        }
        Ok(probe)
    }

    fn post(transport: &T, envelope: Envelope) -> Result<()> {
        tracing::debug!(
            peer = envelope.peer(),
            tag = envelope.tag(),
            len = envelope.len(),
            "send"
        );
        transport.send(envelope.payload(), envelope.peer(), envelope.tag())
    }

    fn consume(transport: &T, probe: Probe) -> Result<Envelope> {
        let mut buffer = vec![0; probe.count];
        transport.recv(&mut buffer, probe.source, probe.tag)?;
        tracing::debug!(
            peer = probe.source,
            tag = probe.tag,
            len = probe.count,
            "receive"
        );
        Ok(Envelope::new(probe.source, probe.tag, buffer))
    }
}
