//! I/O adapters.

mod counting;

pub use counting::CountingWriter;
