//! Ring exchange over MPI: every rank trades a message with both of its
//! neighbors, then the ranks report in order.
//!
//! Run with: cargo build --features mpi --example mpi_ring && mpiexec -n 4 target/debug/examples/mpi_ring

#[cfg(feature = "mpi")]
fn main() -> halo_exchange::Result<()> {
    use halo_exchange::message::MpiTransport;
    use halo_exchange::{Coordinator, Session, TagSpace};

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let session = Session::new(MpiTransport::new());
    let (rank, size) = session.open()?;

    if size == 1 {
        println!("example must be run with >1 processes, e.g. with mpiexec -np 2");
        return session.close();
    }
    let coordinator = Coordinator::new(&session, TagSpace::default());
    let left = (rank + size - 1) % size;
    let right = (rank + 1) % size;
    let peers = vec![left, right].into_iter().collect();
    let outgoing = vec![
        (left, format!("{} -> {}", rank, left).into_bytes()),
        (right, format!("{} -> {}", rank, right).into_bytes()),
    ]
    .into_iter()
    .collect();
    let received = coordinator.exchange_all(&peers, 0, outgoing)?;

    for i in 0..size {
        if rank == i {
            for envelope in received.values() {
                println!(
                    "rank {} received {:?}",
                    rank,
                    String::from_utf8_lossy(envelope.payload())
                );
            }
        }
        session.synchronize()?;
    }
    session.close()
}

#[cfg(not(feature = "mpi"))]
fn main() {
    println!("mpi feature is disabled");
}
