fn main() {
    println!("cargo:rerun-if-changed=src/mpi/mpi.c");

    #[cfg(feature = "mpi")]
    {
        println!("cargo:rustc-link-lib=mpi");
        cc::Build::new().file("src/mpi/mpi.c").compile("halompi");
    }
}
