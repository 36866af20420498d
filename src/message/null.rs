//! Provides a transport for a group of one.
//!
//! Useful for serial runs of code written against [`Transport`], where every
//! exchange has an empty peer set.

use super::transport::{Probe, Rank, Tag, ThreadLevel, Transport};
use crate::error::{Error, Operation, Result};

/// A transport whose group contains only this process. The `rank`, `size`,
/// and `barrier` members work; `send`, `recv`, and `probe` fail, since there
/// is nobody to talk to.
#[derive(Default)]
pub struct NullTransport {}

impl NullTransport {
    pub fn new() -> Self {
        Self {}
    }
}

impl Transport for NullTransport {
    fn init(&self, _required: ThreadLevel) -> Result<ThreadLevel> {
        Ok(ThreadLevel::Multiple)
    }

    fn finalize(&self) -> Result<()> {
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn rank(&self) -> Rank {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, _bytes: &[u8], _dest: Rank, _tag: Tag) -> Result<()> {
        Err(Error::transport(Operation::Send, "cannot send on a null transport"))
    }

    fn recv(&self, _buffer: &mut [u8], _source: Rank, _tag: Tag) -> Result<()> {
        Err(Error::transport(Operation::Recv, "cannot recv on a null transport"))
    }

    fn probe(&self, _tag: Tag) -> Result<Probe> {
        Err(Error::transport(Operation::Probe, "cannot probe on a null transport"))
    }
}
