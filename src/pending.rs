use crate::error::{Error, Result};
use crate::message::{Rank, Tag};
use std::collections::BTreeSet;

/// The peers that still owe a message in one exchange round on one tag.
///
/// Each received message removes its source from the set; the round is
/// complete when the set is empty. A message from a rank that is not (or no
/// longer) in the set means the ranks disagree about the round, so it is an
/// error rather than something to buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    tag: Tag,
    expected: BTreeSet<Rank>,
}

impl PendingExchange {
    pub fn new<I>(tag: Tag, peers: I) -> Self
    where
        I: IntoIterator<Item = Rank>,
    {
        Self {
            tag,
            expected: peers.into_iter().collect(),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Mark the message from `source` as received.
    pub fn satisfy(&mut self, source: Rank) -> Result<()> {
        if self.expected.remove(&source) {
            Ok(())
        } else {
            Err(Error::UnexpectedPeer {
                expected: None,
                actual: source,
                tag: self.tag,
            })
        }
    }

    pub fn is_complete(&self) -> bool {
        self.expected.is_empty()
    }

    /// The number of messages still outstanding.
    pub fn remaining(&self) -> usize {
        self.expected.len()
    }

    pub fn is_expecting(&self, source: Rank) -> bool {
        self.expected.contains(&source)
    }
}
