#![cfg(feature = "mpi")]
//! Binds [`Transport`] to `MPI_COMM_WORLD` through the C shim.

use super::transport::{Probe, Rank, Tag, ThreadLevel, Transport};
use crate::error::{Error, Operation, Result};
use crate::mpi;
use std::convert::TryFrom;

/// The MPI world communicator. MPI state is process-global, so this type
/// carries no data; the [`crate::session::Session`] wrapping it is what
/// guards the init/finalize window.
#[derive(Default)]
pub struct MpiTransport {}

impl MpiTransport {
    pub fn new() -> Self {
        Self {}
    }
}

fn to_int(op: Operation, what: &str, value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::transport(op, format!("{} {} does not fit in an MPI int", what, value)))
}

impl Transport for MpiTransport {
    fn init(&self, required: ThreadLevel) -> Result<ThreadLevel> {
        let mut provided = 0;
        let code = unsafe { mpi::halo_mpi_init(required.to_raw(), &mut provided) };
        Error::check(Operation::Init, code)?;
        Ok(ThreadLevel::from_raw(provided))
    }

    fn finalize(&self) -> Result<()> {
        Error::check(Operation::Finalize, unsafe { mpi::halo_mpi_finalize() })
    }

    fn barrier(&self) -> Result<()> {
        Error::check(Operation::Barrier, unsafe { mpi::halo_mpi_barrier() })
    }

    fn rank(&self) -> Rank {
        let mut rank = 0;
        unsafe { mpi::halo_mpi_comm_rank(&mut rank) };
        rank as Rank
    }

    fn size(&self) -> usize {
        let mut size = 0;
        unsafe { mpi::halo_mpi_comm_size(&mut size) };
        size as usize
    }

    fn send(&self, bytes: &[u8], dest: Rank, tag: Tag) -> Result<()> {
        let count = to_int(Operation::Send, "message length", bytes.len())?;
        let dest = to_int(Operation::Send, "rank", dest)?;
        let tag = to_int(Operation::Send, "tag", tag as usize)?;
        let code = unsafe { mpi::halo_mpi_send(bytes.as_ptr(), count, dest, tag) };
        Error::check(Operation::Send, code)
    }

    fn recv(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<()> {
        let count = to_int(Operation::Recv, "buffer length", buffer.len())?;
        let source = to_int(Operation::Recv, "rank", source)?;
        let tag = to_int(Operation::Recv, "tag", tag as usize)?;
        let code = unsafe { mpi::halo_mpi_recv(buffer.as_mut_ptr(), count, source, tag) };
        Error::check(Operation::Recv, code)
    }

    fn probe(&self, tag: Tag) -> Result<Probe> {
        let raw_tag = to_int(Operation::Probe, "tag", tag as usize)?;
        let mut status = mpi::Status::default();
        let code = unsafe { mpi::halo_mpi_probe_tag(raw_tag, &mut status) };
        Error::check(Operation::Probe, code)?;

        if status.count < 0 || status.source < 0 {
            return Err(Error::transport(
                Operation::Probe,
                format!("probe reported count {} from source {}", status.count, status.source),
            ));
        }
        Ok(Probe {
            source: status.source as Rank,
            tag: status.tag as Tag,
            count: status.count as usize,
        })
    }
}
