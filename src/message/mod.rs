//! The transport seam: a minimal blocking message-passing API.
//!
//! This module exports the [`Transport`] trait, which is everything the
//! session and exchange coordinator need from the communication layer: a
//! lifecycle, rank identity, a barrier, and tagged blocking send, receive,
//! and probe. Bindings are included for MPI ([`MpiTransport`], behind the
//! `mpi` feature), for a single process ([`NullTransport`]), and for a group
//! of threads inside one process ([`LocalTransport`]).

mod local;
mod mpi;
mod null;
mod transport;

pub use local::{Delivery, LocalTransport};
#[cfg(feature = "mpi")]
pub use mpi::MpiTransport;
pub use null::NullTransport;
pub use transport::{Probe, Rank, Tag, ThreadLevel, Transport};
