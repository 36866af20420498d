use crate::error::Result;

/// A process's integer identity within the communicating group.
pub type Rank = usize;

/// A label partitioning logical message classes on a shared channel.
pub type Tag = u32;

/// Threading guarantees a transport can grant, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadLevel {
    /// Only one thread exists.
    Single,
    /// Many threads, but only the initializing one calls the transport.
    Funneled,
    /// Many threads, calls serialized by the caller.
    Serialized,
    /// Any thread may call at any time.
    Multiple,
}

#[cfg_attr(not(feature = "mpi"), allow(dead_code))]
impl ThreadLevel {
    pub(crate) fn from_raw(level: i32) -> Self {
        match level {
            0 => Self::Single,
            1 => Self::Funneled,
            2 => Self::Serialized,
            _ => Self::Multiple,
        }
    }

    pub(crate) fn to_raw(self) -> i32 {
        match self {
            Self::Single => 0,
            Self::Funneled => 1,
            Self::Serialized => 2,
            Self::Multiple => 3,
        }
    }
}

/// Size and origin of a message that is ready to be received, as reported by
/// [`Transport::probe`]. Probing does not consume the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub source: Rank,
    pub tag: Tag,
    pub count: usize,
}

/// The external communication layer. Implementors are assumed reliable,
/// in-order per (source, tag) pair, and at-most-once. Every method except
/// `rank` and `size` may block the calling thread, and none can be
/// cancelled.
///
/// The trait requires `Send + Sync` because an exchange round sends from
/// one thread while it receives on another. An implementation must only
/// grant [`ThreadLevel::Multiple`] from `init` if that is safe.
pub trait Transport: Send + Sync {
    /// Start the transport, requesting the given threading guarantee and
    /// returning the one that was granted.
    fn init(&self, required: ThreadLevel) -> Result<ThreadLevel>;

    /// Shut the transport down. It cannot be restarted.
    fn finalize(&self) -> Result<()>;

    /// Block until every rank in the group has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// The rank of this process.
    fn rank(&self) -> Rank;

    /// The number of ranks in the group.
    fn size(&self) -> usize;

    /// Hand a message off to the transport. Returns once the buffer may be
    /// reused, which says nothing about delivery.
    fn send(&self, bytes: &[u8], dest: Rank, tag: Tag) -> Result<()>;

    /// Receive the next message from `source` on `tag` into a buffer whose
    /// length must equal the message size.
    fn recv(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<()>;

    /// Block until a message on `tag` is available from any source.
    fn probe(&self, tag: Tag) -> Result<Probe>;
}
