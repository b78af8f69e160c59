//! Streaming reassembly: buffered entries, per-direction reassemblers, and
//! the connection demultiplexer.

mod demux;
mod entry;
mod reassembler;

pub use demux::MultiConnectionDemultiplexer;
pub use entry::BufferedEntry;
pub use reassembler::{ConnectionReassembler, METADATA_CAPTURED_AT};
