pub mod lattice;
pub mod sse;
pub mod schedule;
pub mod driver;
pub mod rng;
pub mod stats;
