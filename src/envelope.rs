use crate::coder::Coder;
use crate::error::Result;
use crate::message::{Rank, Tag};

/// A single logical message: an opaque payload with the rank of the peer at
/// the other end and the tag it travels on.
///
/// On the sending side `peer` is the destination; on the receiving side it
/// is the resolved source. Envelopes are built in one piece, once the
/// payload is known, and never modified or shared afterwards: whoever holds
/// one owns it, and [`Envelope::into_payload`] hands the bytes on without a
/// copy.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    peer: Rank,
    tag: Tag,
    payload: Vec<u8>,
}

impl Envelope {
    pub fn new(peer: Rank, tag: Tag, payload: Vec<u8>) -> Self {
        Self { peer, tag, payload }
    }

    pub fn peer(&self) -> Rank {
        self.peer
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Decode the payload with the given coder.
    pub fn decode<C: Coder>(&self, coder: &C) -> Result<C::Type> {
        coder.decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coder::BytesCoder;

    #[test]
    fn envelope_reports_length_of_payload() {
        let envelope = Envelope::new(3, 11, vec![0; 42]);
        assert_eq!(envelope.peer(), 3);
        assert_eq!(envelope.tag(), 11);
        assert_eq!(envelope.len(), 42);
        assert!(!envelope.is_empty());
    }

    #[test]
    fn empty_payload_is_allowed() {
        let envelope = Envelope::new(0, 0, Vec::new());
        assert!(envelope.is_empty());
        assert_eq!(envelope.into_payload(), Vec::<u8>::new());
    }

    #[test]
    fn envelope_decodes_with_a_coder() {
        let envelope = Envelope::new(1, 2, vec![4, 5, 6]);
        assert_eq!(envelope.decode(&BytesCoder).unwrap(), vec![4, 5, 6]);
    }
}
