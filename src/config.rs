//! Configuration for sessions, tag spaces, and communication workers.

use crate::message::{Tag, ThreadLevel};
use std::fmt;
use std::ops::Range;

/// The smallest tag upper bound (exclusive) every MPI implementation has to
/// support.
pub const DEFAULT_TAG_LIMIT: Tag = 32768;

/// The half-open range of tags an application has agreed to use. Distinct
/// exchange kinds should be given disjoint sub-ranges, see
/// [`TagSpace::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpace {
    range: Range<Tag>,
}

impl TagSpace {
    pub fn new(range: Range<Tag>) -> Self {
        Self { range }
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.range.contains(&tag)
    }

    pub fn start(&self) -> Tag {
        self.range.start
    }

    pub fn end(&self) -> Tag {
        self.range.end
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The tag to use for the given round of a recurring exchange. Tags
    /// cycle through the space, so a rank that runs one round ahead of a
    /// neighbor never lands on the tag the neighbor is still draining. The
    /// space must hold at least two tags for that to hold.
    pub fn tag_for_round(&self, round: u64) -> Tag {
        let len = self.len().max(1) as u64;
        self.range.start + (round % len) as Tag
    }

    /// Carve this space into `count` disjoint, equally sized sub-spaces, one
    /// per exchange kind. Tags left over at the top are not assigned.
    pub fn split(&self, count: usize) -> Vec<TagSpace> {
        if count == 0 {
            return Vec::new();
        }
        let width = (self.len() / count) as Tag;
        (0..count as Tag)
            .map(|n| {
                let start = self.range.start + n * width;
                TagSpace::new(start..start + width)
            })
            .collect()
    }
}

impl Default for TagSpace {
    fn default() -> Self {
        Self::new(0..DEFAULT_TAG_LIMIT)
    }
}

impl fmt::Display for TagSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.range.start, self.range.end)
    }
}

/// Options for [`crate::session::Session::open`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The threading guarantee the transport must grant. Defaults to
    /// `Multiple`, which `Coordinator::exchange_all` relies on to send and
    /// receive from two threads at once.
    pub required: ThreadLevel,
}

impl SessionConfig {
    pub fn required(mut self, level: ThreadLevel) -> Self {
        self.required = level;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required: ThreadLevel::Multiple,
        }
    }
}

/// Options for [`crate::worker::Worker`].
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    /// Index of the CPU core to pin the worker thread to. Ignored unless the
    /// `core_affinity` feature is enabled.
    pub core: Option<usize>,
}

impl WorkerConfig {
    pub fn core(mut self, core: usize) -> Self {
        self.core = Some(core);
        self
    }
}
