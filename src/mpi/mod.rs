//! Raw bindings to the C shim in `mpi.c`. Every function returns the MPI
//! error code (zero on success); the communicator is set to
//! `MPI_ERRORS_RETURN` by `halo_mpi_init` so failures are reported rather
//! than aborting the process.

#[repr(C)]
#[derive(Default)]
pub struct Status {
    pub count: i32,
    pub source: i32,
    pub tag: i32,
}

extern "C" {
    pub fn halo_mpi_init(required: i32, provided: *mut i32) -> i32;
    pub fn halo_mpi_finalize() -> i32;
    pub fn halo_mpi_barrier() -> i32;
    pub fn halo_mpi_comm_rank(rank: *mut i32) -> i32;
    pub fn halo_mpi_comm_size(size: *mut i32) -> i32;
    pub fn halo_mpi_send(buf: *const u8, count: i32, dest: i32, tag: i32) -> i32;
    pub fn halo_mpi_recv(buf: *mut u8, count: i32, source: i32, tag: i32) -> i32;
    pub fn halo_mpi_probe_tag(tag: i32, status: *mut Status) -> i32;
}
