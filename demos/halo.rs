//! Diffusion on a periodic 1D grid split across ranks running on threads.
//!
//! Every step each rank sends its two edge cells to its neighbors, receives
//! theirs into its guard cells, and takes an explicit diffusion step. At the
//! end the total heat is reduced to rank 0 and printed.
//!
//! Run with: cargo run --example halo -- --ranks 4 --rendezvous

use clap::Parser;
use halo_exchange::meshing::Cartesian;
use halo_exchange::message::{Delivery, LocalTransport};
use halo_exchange::coder::Coder;
use halo_exchange::{Coordinator, Error, Result, Session, TagSpace};
use std::thread;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Halo exchange on an in-process group of ranks")]
struct Opts {
    /// Number of ranks (threads)
    #[arg(short = 'n', long, default_value_t = 4)]
    ranks: usize,

    /// Number of grid cells per rank
    #[arg(short = 'c', long, default_value_t = 100)]
    cells: usize,

    /// Number of diffusion steps
    #[arg(short = 's', long, default_value_t = 1000)]
    steps: u64,

    /// Use a transport with no send-side buffering
    #[arg(long)]
    rendezvous: bool,
}

fn encode(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|x| x.to_le_bytes().to_vec()).collect()
}

fn decode(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0; 8];
            word.copy_from_slice(chunk);
            f64::from_le_bytes(word)
        })
        .collect()
}

/// Encodes a single float, for summing the heat over all ranks.
struct Heat;

impl Coder for Heat {
    type Type = f64;

    fn encode(&self, inst: &f64) -> Result<Vec<u8>> {
        Ok(encode(&[*inst]))
    }

    fn decode(&self, data: &[u8]) -> Result<f64> {
        match decode(data).as_slice() {
            [value] => Ok(*value),
            _ => Err(Error::Codec(format!("expected 8 bytes, got {}", data.len()))),
        }
    }
}

fn run(opts: Opts, transport: LocalTransport) -> Result<()> {
    let session = Session::new(transport);
    let (rank, size) = session.open()?;
    let lattice = Cartesian::new(size, 1, true);
    let left = lattice.shift(rank, 0, -1).unwrap_or(rank);
    let right = lattice.shift(rank, 0, 1).unwrap_or(rank);
    let peers = lattice.neighbors(rank);

    let mut tags = TagSpace::default().split(2).into_iter();
    let halo_tags = tags.next().unwrap_or_default();
    let reduce_tags = tags.next().unwrap_or_default();
    let coordinator = Coordinator::new(&session, TagSpace::default());

    let n = opts.cells;
    let mut u: Vec<f64> = (0..n + 2)
        .map(|i| {
            let x = (rank * n + i) as f64 / (size * n) as f64;
            (-((x - 0.5) / 0.1).powi(2)).exp()
        })
        .collect();

    for step in 0..opts.steps {
        let tag = halo_tags.tag_for_round(step);
        let edges = encode(&[u[1], u[n]]);
        let outgoing = peers.iter().map(|&p| (p, edges.clone())).collect();
        let received = coordinator.exchange_all(&peers, tag, outgoing)?;

        u[0] = decode(received[&left].payload())[1];
        u[n + 1] = decode(received[&right].payload())[0];

        let next: Vec<f64> = (1..=n)
            .map(|i| u[i] + 0.25 * (u[i - 1] - 2.0 * u[i] + u[i + 1]))
            .collect();
        u[1..=n].copy_from_slice(&next);
    }

    let local_heat: f64 = u[1..=n].iter().sum();
    let total = coordinator.reduce(0, reduce_tags.start(), &Heat, local_heat, |a, b| a + b)?;

    if let Some(total) = total {
        println!("total heat after {} steps: {:.12}", opts.steps, total);
    }
    session.synchronize()?;
    session.close()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let delivery = if opts.rendezvous {
        Delivery::Rendezvous
    } else {
        Delivery::Buffered
    };
    let procs: Vec<_> = LocalTransport::group(opts.ranks, delivery)
        .into_iter()
        .map(|transport| {
            let opts = opts.clone();
            thread::spawn(move || run(opts, transport))
        })
        .collect();

    for (rank, process) in procs.into_iter().enumerate() {
        match process.join() {
            Ok(Ok(())) => {}
            Ok(Err(error)) => eprintln!("rank {} failed: {}", rank, error),
            Err(_) => eprintln!("rank {} panicked", rank),
        }
    }
}
