//! Lifecycle of the process-wide communication context.
//!
//! A [`Session`] owns a [`Transport`] and the window in which it may be
//! used: it is closed until [`Session::open`] succeeds, and closed for good
//! once [`Session::close`] has run. Other components borrow the session and
//! ask it for the transport, which fails with [`Error::SessionClosed`]
//! outside that window.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::message::{Rank, ThreadLevel, Transport};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Identity {
    rank: Rank,
    size: usize,
    granted: ThreadLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Fresh,
    Open(Identity),
    Closed,
}

/// The single communication context of this process.
///
/// `open` and `close` take `&self` so that a coordinator borrowing the
/// session observes the close; they are the only methods that change the
/// session's state.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    state: RwLock<Lifecycle>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: RwLock::new(Lifecycle::Fresh),
        }
    }

    /// Initialize the transport and return this process's rank and the
    /// group size.
    ///
    /// Fails with [`Error::Initialization`] if the transport grants a weaker
    /// threading level than configured. The transport is finalized again in
    /// that case and the session is closed. Opening an open session fails
    /// with [`Error::AlreadyOpen`], and a closed session cannot be reopened.
    pub fn open(&self) -> Result<(Rank, usize)> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        match *state {
            Lifecycle::Open(_) => return Err(Error::AlreadyOpen),
            Lifecycle::Closed => return Err(Error::SessionClosed),
            Lifecycle::Fresh => {}
        }
        let required = self.config.required;
        let granted = self.transport.init(required)?;

        if granted < required {
            *state = Lifecycle::Closed;
            tracing::error!(?required, ?granted, "transport downgraded threading level");

            if let Err(error) = self.transport.finalize() {
                tracing::error!(%error, "failed to finalize the transport");
            }
            return Err(Error::Initialization { required, granted });
        }
        let identity = Identity {
            rank: self.transport.rank(),
            size: self.transport.size(),
            granted,
        };
        *state = Lifecycle::Open(identity);
        tracing::info!(rank = identity.rank, size = identity.size, ?granted, "session opened");
        Ok((identity.rank, identity.size))
    }

    /// Finalize the transport. This must be the last operation on the
    /// session; everything afterwards fails with [`Error::SessionClosed`].
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        match *state {
            Lifecycle::Open(identity) => {
                *state = Lifecycle::Closed;
                self.transport.finalize()?;
                tracing::info!(rank = identity.rank, "session closed");
                Ok(())
            }
            _ => Err(Error::SessionClosed),
        }
    }

    /// Block until every rank has called `synchronize`. Meant for epoch
    /// boundaries only; never call it from inside an exchange round.
    pub fn synchronize(&self) -> Result<()> {
        let transport = self.transport()?;
        tracing::debug!("entering barrier");
        transport.barrier()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.lifecycle(), Lifecycle::Open(_))
    }

    pub fn rank(&self) -> Result<Rank> {
        self.identity().map(|i| i.rank)
    }

    pub fn size(&self) -> Result<usize> {
        self.identity().map(|i| i.size)
    }

    /// The threading level the transport granted at `open`.
    pub fn thread_level(&self) -> Result<ThreadLevel> {
        self.identity().map(|i| i.granted)
    }

    /// The transport, if the session is open.
    pub fn transport(&self) -> Result<&T> {
        self.identity().map(|_| &self.transport)
    }

    fn identity(&self) -> Result<Identity> {
        match self.lifecycle() {
            Lifecycle::Open(identity) => Ok(identity),
            _ => Err(Error::SessionClosed),
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.is_open() {
            tracing::warn!("session dropped while open, finalizing the transport");
            if let Err(error) = self.close() {
                tracing::error!(%error, "failed to finalize the transport");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::message::{Delivery, LocalTransport, NullTransport, Probe, Tag};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// A one-rank transport that counts how often it was finalized.
    struct Counted {
        granted: ThreadLevel,
        finalize_fails: bool,
        finalized: Arc<AtomicUsize>,
    }

    impl Counted {
        fn new(finalized: &Arc<AtomicUsize>) -> Self {
            Self {
                granted: ThreadLevel::Multiple,
                finalize_fails: false,
                finalized: finalized.clone(),
            }
        }
    }

    impl Transport for Counted {
        fn init(&self, _required: ThreadLevel) -> Result<ThreadLevel> {
            Ok(self.granted)
        }

        fn finalize(&self) -> Result<()> {
            self.finalized.fetch_add(1, Ordering::SeqCst);
            if self.finalize_fails {
                Err(Error::transport(Operation::Finalize, "already torn down"))
            } else {
                Ok(())
            }
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

        fn send(&self, bytes: &[u8], dest: Rank, tag: Tag) -> Result<()> {
            NullTransport::new().send(bytes, dest, tag)
        }

        fn recv(&self, buffer: &mut [u8], source: Rank, tag: Tag) -> Result<()> {
            NullTransport::new().recv(buffer, source, tag)
        }

        fn probe(&self, tag: Tag) -> Result<Probe> {
            NullTransport::new().probe(tag)
        }
    }

    fn single() -> LocalTransport {
        LocalTransport::group(1, Delivery::Buffered).pop().unwrap()
    }

    #[test]
    fn open_returns_rank_and_size() {
        let session = Session::new(NullTransport::new());
        assert_eq!(session.open().unwrap(), (0, 1));
        assert!(session.is_open());
        assert_eq!(session.rank().unwrap(), 0);
        assert_eq!(session.size().unwrap(), 1);
        assert_eq!(session.thread_level().unwrap(), ThreadLevel::Multiple);
    }

    #[test]
    fn accessors_fail_before_open() {
        let session = Session::new(NullTransport::new());
        assert!(!session.is_open());
        assert!(matches!(session.rank(), Err(Error::SessionClosed)));
        assert!(matches!(session.transport(), Err(Error::SessionClosed)));
        assert!(matches!(session.synchronize(), Err(Error::SessionClosed)));
    }

    #[test]
    fn opening_twice_is_an_error() {
        let session = Session::new(NullTransport::new());
        session.open().unwrap();
        assert!(matches!(session.open(), Err(Error::AlreadyOpen)));
        assert!(session.is_open());
    }

    #[test]
    fn closed_session_stays_closed() {
        let session = Session::new(NullTransport::new());
        session.open().unwrap();
        session.close().unwrap();
        assert!(!session.is_open());
        assert!(matches!(session.open(), Err(Error::SessionClosed)));
        assert!(matches!(session.close(), Err(Error::SessionClosed)));
        assert!(matches!(session.size(), Err(Error::SessionClosed)));
    }

    #[test]
    fn close_before_open_is_an_error() {
        let session = Session::new(NullTransport::new());
        assert!(matches!(session.close(), Err(Error::SessionClosed)));
    }

    #[test]
    fn downgraded_thread_level_is_a_hard_error() {
        let session = Session::new(single().with_thread_level(ThreadLevel::Serialized));
        match session.open() {
            Err(Error::Initialization { required, granted }) => {
                assert_eq!(required, ThreadLevel::Multiple);
                assert_eq!(granted, ThreadLevel::Serialized);
            }
            other => panic!("expected an initialization error, got {:?}", other.map(|_| ())),
        }
        assert!(!session.is_open());
        assert!(matches!(session.open(), Err(Error::SessionClosed)));
    }

    #[test]
    fn weaker_requirement_accepts_weaker_grant() {
        let config = SessionConfig::default().required(ThreadLevel::Funneled);
        let transport = single().with_thread_level(ThreadLevel::Funneled);
        let session = Session::with_config(transport, config);
        session.open().unwrap();
        assert_eq!(session.thread_level().unwrap(), ThreadLevel::Funneled);
    }

    #[test]
    fn synchronize_waits_for_every_rank() {
        let handles: Vec<_> = LocalTransport::group(4, Delivery::Buffered)
            .into_iter()
            .map(|transport| {
                thread::spawn(move || {
                    let session = Session::new(transport);
                    session.open().unwrap();
                    session.synchronize().unwrap();
                    session.close().unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn dropping_an_open_session_finalizes_once() {
        let finalized = Arc::new(AtomicUsize::new(0));

        drop(Session::new(Counted::new(&finalized)));
        assert_eq!(finalized.load(Ordering::SeqCst), 0);

        let session = Session::new(Counted::new(&finalized));
        session.open().unwrap();
        drop(session);
        assert_eq!(finalized.load(Ordering::SeqCst), 1);

        let session = Session::new(Counted::new(&finalized));
        session.open().unwrap();
        session.close().unwrap();
        drop(session);
        assert_eq!(finalized.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn downgrade_is_reported_even_if_finalize_fails() {
        let finalized = Arc::new(AtomicUsize::new(0));
        let transport = Counted {
            granted: ThreadLevel::Single,
            finalize_fails: true,
            ..Counted::new(&finalized)
        };
        let session = Session::new(transport);

        match session.open() {
            Err(Error::Initialization { required, granted }) => {
                assert_eq!(required, ThreadLevel::Multiple);
                assert_eq!(granted, ThreadLevel::Single);
            }
            other => panic!("expected an initialization error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
        assert!(!session.is_open());
    }
}
