//! Rank-addressed message exchange for distributed grid codes.
//!
//! A [`Session`] owns the process-wide communication context: it opens the
//! [`Transport`] (checking that the threading guarantee is good enough),
//! knows this process's rank and the group size, and finalizes the
//! transport on close. A [`Coordinator`] borrows the session and trades
//! tagged byte messages with other ranks: exact-peer and any-source
//! receives sized by a probe, and [`Coordinator::exchange_all`] rounds in
//! which a rank sends to and receives from a set of peers without deadlock,
//! whatever order the messages arrive in.
//!
//! ```no_run
//! use halo_exchange::message::{Delivery, LocalTransport};
//! use halo_exchange::{Coordinator, Session, TagSpace};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> halo_exchange::Result<()> {
//! let transport = LocalTransport::group(1, Delivery::Buffered).remove(0);
//! let session = Session::new(transport);
//! let (rank, _size) = session.open()?;
//! let coordinator = Coordinator::new(&session, TagSpace::default());
//!
//! let peers = vec![rank].into_iter().collect();
//! let outgoing: BTreeMap<_, _> = vec![(rank, b"halo".to_vec())].into_iter().collect();
//! let received = coordinator.exchange_all(&peers, 0, outgoing)?;
//! assert_eq!(received[&rank].payload(), b"halo");
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod coder;
pub mod config;
pub mod coordinator;
pub mod envelope;
pub mod error;
pub mod meshing;
pub mod message;
#[cfg(feature = "mpi")]
pub mod mpi;
pub mod pending;
pub mod session;
pub mod worker;

pub use config::{SessionConfig, TagSpace, WorkerConfig};
pub use coordinator::Coordinator;
pub use envelope::Envelope;
pub use error::{Error, Operation, Result};
pub use message::{Probe, Rank, Tag, ThreadLevel, Transport};
pub use pending::PendingExchange;
pub use session::Session;
pub use worker::{Completion, Worker};
